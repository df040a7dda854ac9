use std::path::Path;

use geo::{Geometry, LineString, Polygon, coord};
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};

use crate::model::AttributeValue;

pub type Row = (Option<Geometry<f64>>, Vec<AttributeValue>);

pub fn square(x: f64, y: f64, size: f64) -> Geometry<f64> {
    Geometry::Polygon(Polygon::new(
        LineString::from(vec![
            coord! { x: x, y: y },
            coord! { x: x + size, y: y },
            coord! { x: x + size, y: y + size },
            coord! { x: x, y: y + size },
            coord! { x: x, y: y },
        ]),
        Vec::new(),
    ))
}

pub struct PackageBuilder {
    connection: Connection,
}

impl PackageBuilder {
    pub fn create(path: &Path) -> Self {
        let connection = Connection::open(path).expect("create test geopackage");
        connection
            .execute_batch(
                "
                CREATE TABLE gpkg_geometry_columns (
                  table_name TEXT NOT NULL,
                  column_name TEXT NOT NULL,
                  geometry_type_name TEXT NOT NULL,
                  srs_id INTEGER NOT NULL,
                  z TINYINT NOT NULL,
                  m TINYINT NOT NULL
                );
                ",
            )
            .expect("create gpkg_geometry_columns");
        Self { connection }
    }

    pub fn layer(self, name: &str, columns: &[&str], rows: Vec<Row>) -> Self {
        let column_defs: String = columns
            .iter()
            .map(|column| format!(", \"{column}\""))
            .collect();
        self.connection
            .execute_batch(&format!(
                "CREATE TABLE \"{name}\" (fid INTEGER PRIMARY KEY AUTOINCREMENT, geom BLOB{column_defs});"
            ))
            .expect("create layer table");
        self.connection
            .execute(
                "INSERT INTO gpkg_geometry_columns VALUES (?1, 'geom', 'GEOMETRY', 2056, 0, 0)",
                [name],
            )
            .expect("register layer");

        let placeholders: String = (0..=columns.len())
            .map(|idx| format!("?{}", idx + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let names: String = columns.iter().map(|column| format!(", \"{column}\"")).collect();
        let sql = format!("INSERT INTO \"{name}\" (geom{names}) VALUES ({placeholders})");

        for (geometry, values) in rows {
            let mut params = vec![match geometry {
                Some(geometry) => Value::Blob(encode_gpkg_blob(&geometry)),
                None => Value::Null,
            }];
            params.extend(values.into_iter().map(|value| match value {
                AttributeValue::Null => Value::Null,
                AttributeValue::Integer(value) => Value::Integer(value),
                AttributeValue::Real(value) => Value::Real(value),
                AttributeValue::Text(value) => Value::Text(value),
            }));
            self.connection
                .execute(&sql, params_from_iter(params))
                .expect("insert feature");
        }
        self
    }

    pub fn finish(self) {
        drop(self.connection);
    }
}

pub fn encode_gpkg_blob(geometry: &Geometry<f64>) -> Vec<u8> {
    let mut out = b"GP".to_vec();
    out.push(0);
    out.push(0b0000_0001);
    out.extend_from_slice(&2056_i32.to_le_bytes());
    write_wkb(&mut out, geometry);
    out
}

fn write_wkb(out: &mut Vec<u8>, geometry: &Geometry<f64>) {
    out.push(1);
    match geometry {
        Geometry::Point(point) => {
            out.extend_from_slice(&1_u32.to_le_bytes());
            write_coord(out, point.x(), point.y());
        }
        Geometry::LineString(line) => {
            out.extend_from_slice(&2_u32.to_le_bytes());
            write_ring(out, line);
        }
        Geometry::Polygon(polygon) => {
            out.extend_from_slice(&3_u32.to_le_bytes());
            write_polygon_rings(out, polygon);
        }
        Geometry::MultiPolygon(multi) => {
            out.extend_from_slice(&6_u32.to_le_bytes());
            out.extend_from_slice(&(multi.0.len() as u32).to_le_bytes());
            for polygon in &multi.0 {
                write_wkb(out, &Geometry::Polygon(polygon.clone()));
            }
        }
        other => panic!("test encoder does not support {other:?}"),
    }
}

fn write_coord(out: &mut Vec<u8>, x: f64, y: f64) {
    out.extend_from_slice(&x.to_le_bytes());
    out.extend_from_slice(&y.to_le_bytes());
}

fn write_ring(out: &mut Vec<u8>, line: &LineString<f64>) {
    out.extend_from_slice(&(line.0.len() as u32).to_le_bytes());
    for coord in &line.0 {
        write_coord(out, coord.x, coord.y);
    }
}

fn write_polygon_rings(out: &mut Vec<u8>, polygon: &Polygon<f64>) {
    out.extend_from_slice(&(1 + polygon.interiors().len() as u32).to_le_bytes());
    write_ring(out, polygon.exterior());
    for ring in polygon.interiors() {
        write_ring(out, ring);
    }
}
