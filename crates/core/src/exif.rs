use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use exif::{Exif, In, Reader, Tag, Value};

use crate::error::Result;

/// One GPS axis as stored in EXIF: degrees, minutes, seconds and a
/// hemisphere letter (`N`/`S` or `E`/`W`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsCoordinate {
    pub degrees: f64,
    pub minutes: f64,
    pub seconds: f64,
    pub reference: char,
}

/// GPS altitude in whichever representation the file used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Altitude {
    Decimal(f64),
    Ratio { num: u32, denom: u32 },
}

/// The EXIF fields the importer cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoExif {
    pub latitude: Option<GpsCoordinate>,
    pub longitude: Option<GpsCoordinate>,
    pub altitude: Option<Altitude>,
    /// `GPSAltitudeRef` = 1.
    pub below_sea_level: bool,
    pub datetime_original: Option<String>,
    pub orientation: Option<u32>,
    pub description: Option<String>,
}

impl PhotoExif {
    /// Latitude and longitude, when both are present.
    pub fn position(&self) -> Option<(&GpsCoordinate, &GpsCoordinate)> {
        self.latitude.as_ref().zip(self.longitude.as_ref())
    }
}

/// Read the EXIF block of an image file.
pub fn read_exif(path: &Path) -> Result<PhotoExif> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let exif = Reader::new().read_from_container(&mut reader)?;
    Ok(from_exif(&exif))
}

pub fn from_exif(exif: &Exif) -> PhotoExif {
    PhotoExif {
        latitude: coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, 'N'),
        longitude: coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, 'E'),
        altitude: altitude(exif),
        below_sea_level: exif
            .get_field(Tag::GPSAltitudeRef, In::PRIMARY)
            .and_then(|f| f.value.get_uint(0))
            == Some(1),
        datetime_original: ascii(exif, Tag::DateTimeOriginal),
        orientation: exif
            .get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|f| f.value.get_uint(0)),
        description: ascii(exif, Tag::ImageDescription),
    }
}

fn coordinate(exif: &Exif, tag: Tag, ref_tag: Tag, default_ref: char) -> Option<GpsCoordinate> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let (degrees, minutes, seconds) = match field.value {
        Value::Rational(ref v) if v.len() >= 3 => (v[0].to_f64(), v[1].to_f64(), v[2].to_f64()),
        Value::Rational(ref v) if !v.is_empty() => (v[0].to_f64(), 0.0, 0.0),
        _ => return None,
    };
    if !(degrees.is_finite() && minutes.is_finite() && seconds.is_finite()) {
        return None;
    }
    let reference = ascii(exif, ref_tag)
        .and_then(|s| s.chars().next())
        .unwrap_or(default_ref);
    Some(GpsCoordinate {
        degrees,
        minutes,
        seconds,
        reference,
    })
}

fn altitude(exif: &Exif) -> Option<Altitude> {
    let field = exif.get_field(Tag::GPSAltitude, In::PRIMARY)?;
    match field.value {
        Value::Rational(ref v) => v.first().map(|r| Altitude::Ratio {
            num: r.num,
            denom: r.denom,
        }),
        Value::Float(ref v) => v.first().map(|x| Altitude::Decimal(f64::from(*x))),
        Value::Double(ref v) => v.first().map(|x| Altitude::Decimal(*x)),
        _ => None,
    }
}

fn ascii(exif: &Exif, tag: Tag) -> Option<String> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    match field.value {
        Value::Ascii(ref v) => {
            let bytes = v.first()?;
            let text = String::from_utf8_lossy(bytes)
                .trim_end_matches('\0')
                .to_string();
            Some(text)
        }
        _ => None,
    }
}
