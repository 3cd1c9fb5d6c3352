/// Image property extraction
///
/// Translates raw encoded image bytes into a flat key-value property map,
/// or `None` when nothing can be read. The map is an open pass-through:
/// keys are EXIF tag names, plus a few derived entries.

use serde_json::{json, Value};
use std::io::Cursor;

use crate::state::data::Metadata;

/// Extract the flattened property set of an encoded image.
///
/// Primary-IFD EXIF fields become `TagName -> value` entries. Single
/// integers stay numeric; everything else uses the EXIF display form.
/// Pixel dimensions and decimal GPS coordinates are added when available.
pub fn extract_properties(bytes: &[u8]) -> Option<Metadata> {
    let mut properties = Metadata::new();

    if let Ok(exif) = exif::Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        for field in exif.fields().filter(|f| f.ifd_num == exif::In::PRIMARY) {
            properties.insert(field.tag.to_string(), field_value(field, &exif));
        }
        insert_decimal_gps(&exif, &mut properties);
    }

    if let Some((width, height)) = probe_dimensions(bytes) {
        properties.insert("PixelWidth".to_string(), json!(width));
        properties.insert("PixelHeight".to_string(), json!(height));
    }

    if properties.is_empty() {
        None
    } else {
        Some(properties)
    }
}

fn field_value(field: &exif::Field, exif: &exif::Exif) -> Value {
    let single = match field.value {
        exif::Value::Byte(ref v) if v.len() == 1 => Some(u64::from(v[0])),
        exif::Value::Short(ref v) if v.len() == 1 => Some(u64::from(v[0])),
        exif::Value::Long(ref v) if v.len() == 1 => Some(u64::from(v[0])),
        _ => None,
    };

    match single {
        Some(n) => json!(n),
        None => Value::String(
            field
                .display_value()
                .with_unit(exif)
                .to_string()
                .trim_matches('"')
                .to_string(),
        ),
    }
}

fn insert_decimal_gps(exif: &exif::Exif, properties: &mut Metadata) {
    let coordinate = |value_tag, ref_tag, negative: char| {
        let value = exif.get_field(value_tag, exif::In::PRIMARY)?;
        let reference = exif.get_field(ref_tag, exif::In::PRIMARY)?;
        let degrees = dms_to_degrees(&value.value)?;
        let sign = if reference.display_value().to_string().contains(negative) {
            -1.0
        } else {
            1.0
        };
        Some(sign * degrees)
    };

    if let Some(lat) = coordinate(exif::Tag::GPSLatitude, exif::Tag::GPSLatitudeRef, 'S') {
        properties.insert("Latitude".to_string(), json!(lat));
    }
    if let Some(lon) = coordinate(exif::Tag::GPSLongitude, exif::Tag::GPSLongitudeRef, 'W') {
        properties.insert("Longitude".to_string(), json!(lon));
    }
}

/// Degrees/minutes/seconds rationals to decimal degrees
fn dms_to_degrees(value: &exif::Value) -> Option<f64> {
    match value {
        exif::Value::Rational(parts) if parts.len() >= 3 => {
            Some(parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0)
        }
        _ => None,
    }
}

fn probe_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}
