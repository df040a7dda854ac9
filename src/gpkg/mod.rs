mod wkb;

#[cfg(test)]
pub mod testing;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geo::Geometry;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::debug;

use crate::error::{QaError, QaResult};
use crate::model::AttributeValue;

use wkb::decode_gpkg_blob;

#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub declared_srs_id: i64,
    pub srs_id: i64,
    pub columns: Vec<String>,
    pub features: Vec<Feature>,
}

impl Layer {
    pub fn force_crs(&mut self, epsg: u32) {
        let epsg = i64::from(epsg);
        if self.srs_id != epsg {
            debug!(
                layer = %self.name,
                declared = self.declared_srs_id,
                forced = epsg,
                "overriding layer coordinate reference system"
            );
        }
        self.srs_id = epsg;
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|name| name == column)
    }
}

pub struct GeoPackage {
    path: PathBuf,
    connection: Connection,
}

impl GeoPackage {
    pub fn open(path: &Path) -> QaResult<Self> {
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|err| QaError::load(path, "*", err))?;

        Ok(Self {
            path: path.to_path_buf(),
            connection,
        })
    }

    pub fn layer_names(&self) -> QaResult<Vec<String>> {
        let mut statement = self
            .connection
            .prepare("SELECT table_name FROM gpkg_geometry_columns ORDER BY table_name")
            .map_err(|err| QaError::load(&self.path, "gpkg_geometry_columns", err))?;
        let names = statement
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|err| QaError::load(&self.path, "gpkg_geometry_columns", err))?;
        Ok(names)
    }

    pub fn layer(&self, name: &str) -> QaResult<Layer> {
        let registration = self
            .connection
            .query_row(
                "
                SELECT table_name, column_name, srs_id
                FROM gpkg_geometry_columns
                WHERE lower(table_name) = lower(?1)
                ",
                params![name],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|err| QaError::load(&self.path, name, err))?;

        let Some((table, geometry_column, srs_id)) = registration else {
            let available = self.layer_names().unwrap_or_default().join(", ");
            return Err(QaError::load(
                &self.path,
                name,
                format!("layer not found (available: {available})"),
            ));
        };

        let (columns, features) = self
            .read_features(&table, &geometry_column)
            .map_err(|reason| QaError::load(&self.path, name, reason))?;

        debug!(
            path = %self.path.display(),
            layer = %table,
            features = features.len(),
            "loaded layer"
        );

        let srs_id = srs_id.unwrap_or(0);
        Ok(Layer {
            name: table,
            declared_srs_id: srs_id,
            srs_id,
            columns,
            features,
        })
    }

    fn read_features(
        &self,
        table: &str,
        geometry_column: &str,
    ) -> Result<(Vec<String>, Vec<Feature>), String> {
        let sql = format!("SELECT * FROM {}", quote_identifier(table));
        let mut statement = self.connection.prepare(&sql).map_err(|err| err.to_string())?;

        let names: Vec<String> = statement
            .column_names()
            .into_iter()
            .map(ToOwned::to_owned)
            .collect();
        let geometry_index = names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(geometry_column))
            .ok_or_else(|| format!("geometry column `{geometry_column}` missing"))?;

        let mut rows = statement.query([]).map_err(|err| err.to_string())?;
        let mut features = Vec::new();
        while let Some(row) = rows.next().map_err(|err| err.to_string())? {
            let mut geometry = None;
            let mut attributes = BTreeMap::new();

            for (idx, name) in names.iter().enumerate() {
                let value = row.get_ref(idx).map_err(|err| err.to_string())?;
                if idx == geometry_index {
                    geometry = match value {
                        ValueRef::Blob(blob) => {
                            decode_gpkg_blob(blob).map_err(|err| err.to_string())?
                        }
                        _ => None,
                    };
                    continue;
                }

                let value = match value {
                    ValueRef::Null => AttributeValue::Null,
                    ValueRef::Integer(value) => AttributeValue::Integer(value),
                    ValueRef::Real(value) => AttributeValue::Real(value),
                    ValueRef::Text(bytes) => {
                        AttributeValue::Text(String::from_utf8_lossy(bytes).into_owned())
                    }
                    ValueRef::Blob(_) => continue,
                };
                attributes.insert(name.clone(), value);
            }

            features.push(Feature {
                geometry,
                attributes,
            });
        }

        let columns = names
            .into_iter()
            .enumerate()
            .filter(|(idx, _)| *idx != geometry_index)
            .map(|(_, name)| name)
            .collect();

        Ok((columns, features))
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use geo::{Geometry, Point};

    use super::*;
    use crate::gpkg::testing::{PackageBuilder, square};

    #[test]
    fn reads_layer_attributes_and_geometry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("lots.gpkg");
        PackageBuilder::create(&path)
            .layer(
                "lots",
                &["Id", "Name"],
                vec![
                    (Some(square(0.0, 0.0, 10.0)), vec![AttributeValue::Integer(1), "north".into()]),
                    (None, vec![AttributeValue::Integer(2), AttributeValue::Null]),
                ],
            )
            .finish();

        let package = GeoPackage::open(&path).expect("open");
        let layer = package.layer("LOTS").expect("layer lookup is case-insensitive");

        assert_eq!(layer.name, "lots");
        assert_eq!(layer.srs_id, 2056);
        assert!(layer.has_column("Id"));
        assert!(!layer.has_column("geom"));
        assert_eq!(layer.features.len(), 2);
        assert_eq!(layer.features[0].attributes["Name"], AttributeValue::from("north"));
        assert!(layer.features[0].geometry.is_some());
        assert!(layer.features[1].geometry.is_none());
        assert_eq!(layer.features[1].attributes["Name"], AttributeValue::Null);
    }

    #[test]
    fn missing_layer_is_a_load_error_listing_available_layers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("issue.gpkg");
        PackageBuilder::create(&path)
            .layer(
                "IssuePoints",
                &["IssueType"],
                vec![(Some(Geometry::Point(Point::new(1.0, 1.0))), vec!["Error".into()])],
            )
            .finish();

        let package = GeoPackage::open(&path).expect("open");
        let err = package.layer("IssueLines").expect_err("layer is absent");
        match err {
            QaError::Load { layer, reason, .. } => {
                assert_eq!(layer, "IssueLines");
                assert!(reason.contains("IssuePoints"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn force_crs_overrides_declared_system() {
        let mut layer = Layer {
            name: "IssuePoints".to_string(),
            declared_srs_id: 21781,
            srs_id: 21781,
            columns: Vec::new(),
            features: Vec::new(),
        };
        layer.force_crs(2056);
        assert_eq!(layer.srs_id, 2056);
        assert_eq!(layer.declared_srs_id, 21781);
    }

    #[test]
    fn opening_a_missing_package_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = GeoPackage::open(&dir.path().join("absent.gpkg"));
        assert!(matches!(result, Err(QaError::Load { .. })));
    }
}
