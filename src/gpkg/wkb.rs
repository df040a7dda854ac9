use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use thiserror::Error;

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;

#[derive(Debug, Error, PartialEq)]
pub enum WkbError {
    #[error("geometry blob does not start with the GeoPackage magic")]
    BadMagic,
    #[error("invalid envelope indicator {0}")]
    BadEnvelope(u8),
    #[error("invalid byte order marker {0}")]
    BadByteOrder(u8),
    #[error("unsupported WKB geometry type {0}")]
    UnsupportedType(u32),
    #[error("unexpected member type {found} inside a multi-geometry of type {container}")]
    MemberType { container: u32, found: u32 },
    #[error("geometry blob is truncated")]
    Truncated,
}

pub fn decode_gpkg_blob(blob: &[u8]) -> Result<Option<Geometry<f64>>, WkbError> {
    if blob.len() < 8 || &blob[..2] != b"GP" {
        return Err(WkbError::BadMagic);
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
        other => return Err(WkbError::BadEnvelope(other)),
    };

    let body = blob.get(8 + envelope_len..).ok_or(WkbError::Truncated)?;
    let geometry = WkbReader::new(body).geometry()?;
    Ok((!is_empty_point(&geometry)).then_some(geometry))
}

fn is_empty_point(geometry: &Geometry<f64>) -> bool {
    matches!(geometry, Geometry::Point(point) if point.x().is_nan() && point.y().is_nan())
}

struct WkbReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WkbReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], WkbError> {
        let end = self.pos + N;
        let slice = self.bytes.get(self.pos..end).ok_or(WkbError::Truncated)?;
        self.pos = end;
        let mut out = [0_u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u32(&mut self, little: bool) -> Result<u32, WkbError> {
        let raw = self.take::<4>()?;
        Ok(if little {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    }

    fn f64(&mut self, little: bool) -> Result<f64, WkbError> {
        let raw = self.take::<8>()?;
        Ok(if little {
            f64::from_le_bytes(raw)
        } else {
            f64::from_be_bytes(raw)
        })
    }

    fn geometry(&mut self) -> Result<Geometry<f64>, WkbError> {
        let (kind, little, dims) = self.header()?;
        self.body(kind, little, dims)
    }

    fn header(&mut self) -> Result<(u32, bool, usize), WkbError> {
        let little = match self.take::<1>()?[0] {
            0 => false,
            1 => true,
            other => return Err(WkbError::BadByteOrder(other)),
        };

        let raw = self.u32(little)?;
        if raw & EWKB_SRID != 0 {
            self.u32(little)?;
        }

        let mut dims = 2;
        if raw & EWKB_Z != 0 {
            dims += 1;
        }
        if raw & EWKB_M != 0 {
            dims += 1;
        }

        let base = raw & 0x0FFF_FFFF;
        dims += match base / 1000 {
            0 => 0,
            1 | 2 => 1,
            3 => 2,
            _ => return Err(WkbError::UnsupportedType(raw)),
        };

        Ok((base % 1000, little, dims))
    }

    fn body(&mut self, kind: u32, little: bool, dims: usize) -> Result<Geometry<f64>, WkbError> {
        let geometry = match kind {
            1 => Geometry::Point(Point::from(self.coord(little, dims)?)),
            2 => Geometry::LineString(self.line_string(little, dims)?),
            3 => Geometry::Polygon(self.polygon(little, dims)?),
            4 => {
                let points = self.members(kind, 1, little, |geometry| match geometry {
                    Geometry::Point(point) => Some(point),
                    _ => None,
                })?;
                Geometry::MultiPoint(MultiPoint::new(points))
            }
            5 => {
                let lines = self.members(kind, 2, little, |geometry| match geometry {
                    Geometry::LineString(line) => Some(line),
                    _ => None,
                })?;
                Geometry::MultiLineString(MultiLineString::new(lines))
            }
            6 => {
                let polygons = self.members(kind, 3, little, |geometry| match geometry {
                    Geometry::Polygon(polygon) => Some(polygon),
                    _ => None,
                })?;
                Geometry::MultiPolygon(MultiPolygon::new(polygons))
            }
            7 => {
                let count = self.u32(little)?;
                let mut members = Vec::new();
                for _ in 0..count {
                    members.push(self.geometry()?);
                }
                Geometry::GeometryCollection(GeometryCollection(members))
            }
            other => return Err(WkbError::UnsupportedType(other)),
        };
        Ok(geometry)
    }

    fn members<T>(
        &mut self,
        container: u32,
        expected: u32,
        little: bool,
        extract: impl Fn(Geometry<f64>) -> Option<T>,
    ) -> Result<Vec<T>, WkbError> {
        let count = self.u32(little)?;
        let mut out = Vec::new();
        for _ in 0..count {
            let (kind, member_little, dims) = self.header()?;
            if kind != expected {
                return Err(WkbError::MemberType {
                    container,
                    found: kind,
                });
            }
            let member = self.body(kind, member_little, dims)?;
            out.push(extract(member).ok_or(WkbError::MemberType {
                container,
                found: kind,
            })?);
        }
        Ok(out)
    }

    fn coord(&mut self, little: bool, dims: usize) -> Result<Coord<f64>, WkbError> {
        let x = self.f64(little)?;
        let y = self.f64(little)?;
        for _ in 2..dims {
            self.f64(little)?;
        }
        Ok(Coord { x, y })
    }

    fn coords(&mut self, little: bool, dims: usize) -> Result<Vec<Coord<f64>>, WkbError> {
        let count = self.u32(little)?;
        let mut coords = Vec::new();
        for _ in 0..count {
            coords.push(self.coord(little, dims)?);
        }
        Ok(coords)
    }

    fn line_string(&mut self, little: bool, dims: usize) -> Result<LineString<f64>, WkbError> {
        Ok(LineString::new(self.coords(little, dims)?))
    }

    fn polygon(&mut self, little: bool, dims: usize) -> Result<Polygon<f64>, WkbError> {
        let rings = self.u32(little)?;
        if rings == 0 {
            return Ok(Polygon::new(LineString::new(Vec::new()), Vec::new()));
        }

        let exterior = self.line_string(little, dims)?;
        let mut interiors = Vec::new();
        for _ in 1..rings {
            interiors.push(self.line_string(little, dims)?);
        }
        Ok(Polygon::new(exterior, interiors))
    }
}
