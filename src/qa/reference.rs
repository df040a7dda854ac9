use std::collections::BTreeMap;
use std::path::Path;

use geo::{BoundingRect, Geometry, Intersects, Rect, coord};
use tracing::info;

use crate::config::QaConfig;
use crate::error::{QaError, QaResult};
use crate::gpkg::{GeoPackage, Layer};
use crate::model::AttributeValue;

#[derive(Debug, Clone)]
pub struct Region {
    pub region_id: String,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub geometry: Option<Geometry<f64>>,
    bbox: Option<Rect<f64>>,
}

impl Region {
    pub fn new(
        region_id: String,
        attributes: BTreeMap<String, AttributeValue>,
        geometry: Option<Geometry<f64>>,
    ) -> Self {
        let bbox = geometry.as_ref().and_then(|geometry| geometry.bounding_rect());
        Self {
            region_id,
            attributes,
            geometry,
            bbox,
        }
    }

    pub fn intersects(&self, geometry: &Geometry<f64>, bbox: Option<&Rect<f64>>) -> bool {
        let (Some(own), Some(region_bbox)) = (self.geometry.as_ref(), self.bbox.as_ref()) else {
            return false;
        };
        if let Some(bbox) = bbox {
            if !region_bbox.intersects(bbox) {
                return false;
            }
        }
        own.intersects(geometry)
    }
}

#[derive(Debug, Clone)]
pub struct ReferencePartition {
    pub epsg: u32,
    pub columns: Vec<String>,
    regions: Vec<Region>,
}

impl ReferencePartition {
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }
}

pub fn load_reference(
    source: &Path,
    layer_name: &str,
    config: &QaConfig,
) -> QaResult<ReferencePartition> {
    let package = GeoPackage::open(source)?;
    let layer = package.layer(layer_name)?;
    let partition = partition_from_layer(source, layer, config)?;

    info!(
        source = %source.display(),
        layer = layer_name,
        regions = partition.len(),
        columns = partition.columns.len(),
        epsg = partition.epsg,
        "loaded reference partition"
    );

    Ok(partition)
}

pub fn partition_from_layer(
    source: &Path,
    mut layer: Layer,
    config: &QaConfig,
) -> QaResult<ReferencePartition> {
    layer.force_crs(config.epsg);

    let derive_ids = !layer.has_column(&config.region_column);
    if derive_ids && !layer.has_column(&config.identity_column) {
        return Err(QaError::load(
            source,
            &layer.name,
            format!(
                "neither `{}` nor `{}` attribute present",
                config.region_column, config.identity_column
            ),
        ));
    }

    let mut columns = layer.columns.clone();
    if derive_ids {
        columns.push(config.region_column.clone());
    }

    let mut regions = Vec::with_capacity(layer.features.len() + 1);
    for (idx, feature) in layer.features.into_iter().enumerate() {
        let mut attributes = feature.attributes;

        let region_id = if derive_ids {
            let identity = attributes
                .get(&config.identity_column)
                .and_then(AttributeValue::as_i64)
                .ok_or_else(|| {
                    QaError::load(
                        source,
                        &layer.name,
                        format!(
                            "feature {idx} has no integer `{}` to derive a region id from",
                            config.identity_column
                        ),
                    )
                })?;
            let region_id = identity.to_string();
            attributes.insert(
                config.region_column.clone(),
                AttributeValue::Text(region_id.clone()),
            );
            region_id
        } else {
            attributes
                .get(&config.region_column)
                .map(ToString::to_string)
                .unwrap_or_default()
        };

        regions.push(Region::new(region_id, attributes, feature.geometry));
    }

    regions.push(territory_region(config));

    Ok(ReferencePartition {
        epsg: config.epsg,
        columns,
        regions,
    })
}

pub fn territory_region(config: &QaConfig) -> Region {
    let [min_x, min_y, max_x, max_y] = config.territory_bbox;
    let rect = Rect::new(coord! { x: min_x, y: min_y }, coord! { x: max_x, y: max_y });

    let mut attributes = BTreeMap::new();
    attributes.insert(
        config.region_column.clone(),
        AttributeValue::Text(config.territory_region_id.clone()),
    );

    Region::new(
        config.territory_region_id.clone(),
        attributes,
        Some(Geometry::Polygon(rect.to_polygon())),
    )
}

pub fn load_outline(source: &Path, config: &QaConfig) -> QaResult<Vec<Geometry<f64>>> {
    let package = GeoPackage::open(source)?;
    let mut layer = package.layer(&config.outline_layer)?;
    layer.force_crs(config.epsg);

    Ok(layer
        .features
        .into_iter()
        .filter_map(|feature| feature.geometry)
        .collect())
}
