//! GeoPackage geometry blobs: the `GP` header followed by WKB.
//!
//! Only points are produced or understood.

use crate::domain::Point;
use crate::error::{Error, Result};

const MAGIC: &[u8; 2] = b"GP";
const WKB_POINT: u32 = 1;
const WKB_POINT_Z: u32 = 1001;
const WKB_POINT_M: u32 = 2001;
const WKB_POINT_ZM: u32 = 3001;
const EWKB_Z_FLAG: u32 = 0x8000_0000;
const EWKB_M_FLAG: u32 = 0x4000_0000;

/// Encode a point as a little-endian GeoPackage blob without envelope.
pub fn encode(point: &Point, srs_id: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + 5 + 24);
    buf.extend_from_slice(MAGIC);
    buf.push(0); // version 1
    buf.push(0b0000_0001); // little endian header, no envelope
    buf.extend_from_slice(&srs_id.to_le_bytes());

    buf.push(1); // little endian WKB
    match point.z {
        Some(z) => {
            buf.extend_from_slice(&WKB_POINT_Z.to_le_bytes());
            buf.extend_from_slice(&point.x.to_le_bytes());
            buf.extend_from_slice(&point.y.to_le_bytes());
            buf.extend_from_slice(&z.to_le_bytes());
        }
        None => {
            buf.extend_from_slice(&WKB_POINT.to_le_bytes());
            buf.extend_from_slice(&point.x.to_le_bytes());
            buf.extend_from_slice(&point.y.to_le_bytes());
        }
    }
    buf
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    little: bool,
}

impl<'a> Cursor<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| Error::InvalidGeometry("truncated blob".to_string()))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take::<4>()?;
        Ok(if self.little {
            u32::from_le_bytes(b)
        } else {
            u32::from_be_bytes(b)
        })
    }

    fn f64(&mut self) -> Result<f64> {
        let b = self.take::<8>()?;
        Ok(if self.little {
            f64::from_le_bytes(b)
        } else {
            f64::from_be_bytes(b)
        })
    }
}

/// Decode a GeoPackage point blob. Empty geometries decode to `None`.
pub fn decode(blob: &[u8]) -> Result<Option<Point>> {
    if blob.len() < 8 || &blob[0..2] != MAGIC {
        return Err(Error::InvalidGeometry("missing GP header".to_string()));
    }
    let flags = blob[3];
    if flags & 0b0001_0000 != 0 {
        return Ok(None);
    }
    let envelope_len = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => {
            return Err(Error::InvalidGeometry(format!(
                "invalid envelope indicator {other}"
            )))
        }
    };

    let wkb_start = 8 + envelope_len;
    let wkb = blob
        .get(wkb_start..)
        .ok_or_else(|| Error::InvalidGeometry("truncated envelope".to_string()))?;
    let order = *wkb
        .first()
        .ok_or_else(|| Error::InvalidGeometry("missing WKB".to_string()))?;
    let mut cur = Cursor {
        buf: wkb,
        pos: 1,
        little: match order {
            0 => false,
            1 => true,
            other => {
                return Err(Error::InvalidGeometry(format!("invalid WKB byte order {other}")))
            }
        },
    };

    let raw_type = cur.u32()?;
    let (has_z, has_m) = match raw_type {
        WKB_POINT => (false, false),
        WKB_POINT_Z => (true, false),
        WKB_POINT_M => (false, true),
        WKB_POINT_ZM => (true, true),
        t if t & 0x0FFF_FFFF == WKB_POINT => (t & EWKB_Z_FLAG != 0, t & EWKB_M_FLAG != 0),
        other => {
            return Err(Error::InvalidGeometry(format!(
                "unsupported geometry type {other}"
            )))
        }
    };

    let x = cur.f64()?;
    let y = cur.f64()?;
    let z = if has_z { Some(cur.f64()?) } else { None };
    if has_m {
        cur.f64()?;
    }
    if x.is_nan() && y.is_nan() {
        return Ok(None);
    }
    Ok(Some(Point { x, y, z }))
}
