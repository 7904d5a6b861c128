use std::io::BufRead;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::archive;
use crate::error::Result;
use crate::model::{
    accepts, categorize, describe, BoundingBox, Category, Mode, PoiRecord, RawEntity,
};
use crate::xml::XmlEntities;

#[cfg(not(feature = "pbf"))]
use crate::error::Error;

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub bounds: Option<BoundingBox>,
    pub mode: Mode,
}

/// Which parser a file gets, decided by its extension upstream of the
/// driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Xml,
    Pbf,
}

pub fn backend_for(path: &Path) -> Backend {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("pbf") => Backend::Pbf,
        _ => Backend::Xml,
    }
}

/// The global record budget. Owned by the aggregator; each file inherits
/// whatever is left as its own cap, so the total accepted across files can
/// never exceed the original cap.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    cap: usize,
    used: usize,
}

impl Budget {
    pub fn new(cap: usize) -> Self {
        Self { cap, used: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.cap - self.used
    }

    pub fn exhausted(&self) -> bool {
        self.used >= self.cap
    }

    pub fn consume(&mut self, count: usize) {
        debug_assert!(count <= self.remaining());
        self.used += count;
    }
}

/// Converts one raw entity to a finished record, or drops it.
///
/// Both modes drop untagged entities and anything rejected by the spatial
/// filter. Strict mode additionally requires a non-empty `name` tag and a
/// matching rule; lenient mode falls back to `other` for named entities and
/// synthesizes `Unknown <Category>` names for unnamed matches.
pub fn poi_from_entity(entity: RawEntity, opts: &ExtractOptions) -> Option<PoiRecord> {
    if entity.tags.is_empty() {
        return None;
    }
    if !accepts(entity.lat, entity.lon, opts.bounds.as_ref()) {
        return None;
    }

    let category = categorize(&entity.tags);
    let name = entity.tags.get("name").filter(|name| !name.is_empty());
    let (name, category) = match opts.mode {
        Mode::Strict => (name?.to_string(), category?),
        Mode::Lenient => match (name, category) {
            (Some(name), category) => (name.to_string(), category.unwrap_or(Category::Other)),
            (None, Some(category)) => (format!("Unknown {}", category.title()), category),
            (None, None) => return None,
        },
    };

    let description = describe(&entity.tags);
    Some(PoiRecord {
        name,
        category,
        latitude: entity.lat,
        longitude: entity.lon,
        description,
    })
}

/// The per-file extraction driver: pulls entities until the source ends or
/// `cap` records have been accepted. Backend-agnostic; a parse failure
/// mid-stream fails the whole file.
pub fn drive<I>(mut entities: I, opts: &ExtractOptions, cap: usize) -> Result<Vec<PoiRecord>>
where
    I: Iterator<Item = Result<RawEntity>>,
{
    let mut records = Vec::new();
    while records.len() < cap {
        let Some(entity) = entities.next() else {
            break;
        };
        if let Some(record) = poi_from_entity(entity?, opts) {
            records.push(record);
            if records.len() % 500 == 0 {
                debug!("accepted {} POIs so far", records.len());
            }
        }
    }
    Ok(records)
}

pub fn extract_xml<R: BufRead>(
    source: R,
    opts: &ExtractOptions,
    cap: usize,
) -> Result<Vec<PoiRecord>> {
    drive(XmlEntities::new(source), opts, cap)
}

/// Opens one file and runs the driver with the backend its extension calls
/// for. XML sources may be gzip- or bzip2-compressed.
pub fn extract_file(path: &Path, opts: &ExtractOptions, cap: usize) -> Result<Vec<PoiRecord>> {
    match backend_for(path) {
        Backend::Xml => extract_xml(archive::open_xml_source(path)?, opts, cap),
        #[cfg(feature = "pbf")]
        Backend::Pbf => crate::pbf::extract_pbf(archive::open_file(path)?, opts, cap),
        #[cfg(not(feature = "pbf"))]
        Backend::Pbf => Err(Error::BackendUnavailable("pbf")),
    }
}

/// Runs the driver over every file in caller order under one global budget.
/// A failing file is logged and skipped; once the budget is exhausted the
/// remaining files are not even opened. Output preserves file-then-entity
/// discovery order.
pub fn aggregate(files: &[PathBuf], opts: &ExtractOptions, global_cap: usize) -> Vec<PoiRecord> {
    let mut budget = Budget::new(global_cap);
    let mut records = Vec::new();

    for path in files {
        if budget.exhausted() {
            info!(
                "POI budget of {global_cap} reached, skipping remaining files"
            );
            break;
        }
        match extract_file(path, opts, budget.remaining()) {
            Ok(extracted) => {
                if extracted.is_empty() {
                    info!("no POIs found in {}", path.display());
                } else {
                    info!("extracted {} POIs from {}", extracted.len(), path.display());
                }
                budget.consume(extracted.len());
                records.extend(extracted);
            }
            Err(err) => warn!("skipping {}: {err}", path.display()),
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TagSet;
    use std::cell::Cell;
    use tempfile::tempdir;

    fn entity(lat: f64, lon: f64, pairs: &[(&str, &str)]) -> RawEntity {
        RawEntity {
            id: 1,
            lat,
            lon,
            tags: pairs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect::<TagSet>(),
        }
    }

    fn opts(mode: Mode) -> ExtractOptions {
        ExtractOptions { bounds: None, mode }
    }

    #[test]
    fn strict_mode_requires_name_and_matching_rule() {
        let strict = opts(Mode::Strict);
        assert!(poi_from_entity(entity(1.0, 2.0, &[]), &strict).is_none());
        assert!(poi_from_entity(entity(1.0, 2.0, &[("amenity", "cafe")]), &strict).is_none());
        assert!(
            poi_from_entity(entity(1.0, 2.0, &[("name", "X"), ("building", "yes")]), &strict)
                .is_none()
        );

        let record = poi_from_entity(
            entity(1.0, 2.0, &[("name", "Cafe X"), ("amenity", "cafe")]),
            &strict,
        )
        .unwrap();
        assert_eq!(record.name, "Cafe X");
        assert_eq!(record.category, Category::Restaurant);
    }

    #[test]
    fn lenient_mode_synthesizes_names_and_falls_back_to_other() {
        let lenient = opts(Mode::Lenient);

        let unnamed = poi_from_entity(entity(1.0, 2.0, &[("amenity", "fuel")]), &lenient).unwrap();
        assert_eq!(unnamed.name, "Unknown Transportation");
        assert_eq!(unnamed.category, Category::Transportation);

        let unmatched = poi_from_entity(
            entity(1.0, 2.0, &[("name", "Shed"), ("building", "yes")]),
            &lenient,
        )
        .unwrap();
        assert_eq!(unmatched.category, Category::Other);

        // unnamed and unmatched is still a drop, as is a bare tagless node
        assert!(poi_from_entity(entity(1.0, 2.0, &[("building", "yes")]), &lenient).is_none());
        assert!(poi_from_entity(entity(1.0, 2.0, &[]), &lenient).is_none());
    }

    #[test]
    fn restaurant_scenario_description() {
        let record = poi_from_entity(
            entity(
                48.85,
                2.29,
                &[("amenity", "restaurant"), ("cuisine", "italian"), ("name", "Cafe X")],
            ),
            &opts(Mode::Strict),
        )
        .unwrap();
        assert_eq!(record.name, "Cafe X");
        assert_eq!(record.category, Category::Restaurant);
        assert!(record.description.contains("Amenity: restaurant"));
        assert!(record.description.contains("Cuisine: italian"));
    }

    #[test]
    fn out_of_range_and_filtered_coordinates_are_dropped() {
        let lenient = opts(Mode::Lenient);
        assert!(poi_from_entity(entity(95.0, 0.0, &[("amenity", "cafe")]), &lenient).is_none());

        let boxed = ExtractOptions {
            bounds: Some(BoundingBox {
                min_lat: 0.0,
                max_lat: 1.0,
                min_lng: 0.0,
                max_lng: 1.0,
            }),
            mode: Mode::Lenient,
        };
        assert!(poi_from_entity(entity(2.0, 0.5, &[("amenity", "cafe")]), &boxed).is_none());
        assert!(poi_from_entity(entity(0.5, 0.5, &[("amenity", "cafe")]), &boxed).is_some());
    }

    #[test]
    fn drive_stops_pulling_at_the_cap() {
        let pulled = Cell::new(0usize);
        let entities = (0..100).map(|_| {
            pulled.set(pulled.get() + 1);
            Ok(entity(1.0, 2.0, &[("amenity", "cafe")]))
        });

        let records = drive(entities, &opts(Mode::Lenient), 3).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(pulled.get(), 3);
    }

    #[test]
    fn drive_with_zero_cap_pulls_nothing() {
        let pulled = Cell::new(0usize);
        let entities = (0..10).map(|_| {
            pulled.set(pulled.get() + 1);
            Ok(entity(1.0, 2.0, &[("amenity", "cafe")]))
        });
        let records = drive(entities, &opts(Mode::Lenient), 0).unwrap();
        assert!(records.is_empty());
        assert_eq!(pulled.get(), 0);
    }

    const POIS_A: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<osm version="0.6">
  <node id="1" lat="1.0" lon="1.0"><tag k="name" v="A1"/><tag k="amenity" v="cafe"/></node>
  <node id="2" lat="1.1" lon="1.1"><tag k="name" v="A2"/><tag k="amenity" v="bank"/></node>
</osm>
"#;

    const POIS_B: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<osm version="0.6">
  <node id="3" lat="2.0" lon="2.0"><tag k="name" v="B1"/><tag k="shop" v="bakery"/></node>
  <node id="4" lat="2.1" lon="2.1"><tag k="name" v="B2"/><tag k="amenity" v="school"/></node>
</osm>
"#;

    fn names(records: &[PoiRecord]) -> Vec<&str> {
        records.iter().map(|record| record.name.as_str()).collect()
    }

    #[test]
    fn aggregate_honors_the_global_cap_in_discovery_order() {
        let dir = tempdir().unwrap();
        let file_a = dir.path().join("a.osm");
        let file_b = dir.path().join("b.osm");
        std::fs::write(&file_a, POIS_A).unwrap();
        std::fs::write(&file_b, POIS_B).unwrap();
        let files = vec![file_a, file_b];

        let capped = aggregate(&files, &opts(Mode::Strict), 3);
        assert_eq!(names(&capped), vec!["A1", "A2", "B1"]);

        // monotonic: raising the cap never shrinks the result
        let uncapped = aggregate(&files, &opts(Mode::Strict), 100);
        assert_eq!(names(&uncapped), vec!["A1", "A2", "B1", "B2"]);

        let exhausted = aggregate(&files, &opts(Mode::Strict), 2);
        assert_eq!(names(&exhausted), vec!["A1", "A2"]);
    }

    #[test]
    fn aggregate_skips_broken_files_and_continues() {
        let dir = tempdir().unwrap();
        let file_a = dir.path().join("a.osm");
        let broken = dir.path().join("broken.osm");
        let file_b = dir.path().join("b.osm");
        std::fs::write(&file_a, POIS_A).unwrap();
        // one good node, then a mismatched closing tag: the file must
        // contribute zero records, not one
        std::fs::write(
            &broken,
            r#"<osm><node id="9" lat="1.0" lon="1.0"><tag k="name" v="Ghost"/><tag k="amenity" v="cafe"/></node><node id="10" lat="1.0" lon="1.0"></oops></osm>"#,
        )
        .unwrap();
        std::fs::write(&file_b, POIS_B).unwrap();

        let records = aggregate(
            &[file_a, broken, dir.path().join("missing.osm"), file_b],
            &opts(Mode::Strict),
            100,
        );
        assert_eq!(names(&records), vec!["A1", "A2", "B1", "B2"]);
    }

    #[test]
    fn backend_is_chosen_by_extension() {
        assert_eq!(backend_for(Path::new("x.osm")), Backend::Xml);
        assert_eq!(backend_for(Path::new("x.osm.gz")), Backend::Xml);
        assert_eq!(backend_for(Path::new("x.osm.pbf")), Backend::Pbf);
        assert_eq!(backend_for(Path::new("x.pbf")), Backend::Pbf);
    }

    #[test]
    fn budget_accounting() {
        let mut budget = Budget::new(5);
        assert_eq!(budget.remaining(), 5);
        budget.consume(3);
        assert_eq!(budget.remaining(), 2);
        assert!(!budget.exhausted());
        budget.consume(2);
        assert!(budget.exhausted());
    }
}
