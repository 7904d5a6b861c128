use std::io::Read;

use osmpbfreader::{OsmObj, OsmPbfReader};

use crate::error::{Error, Result};
use crate::extract::{drive, ExtractOptions};
use crate::model::{PoiRecord, RawEntity, TagSet};

/// Extracts POIs from a PBF source. The decoder streams blob by blob and the
/// driver stops pulling once its cap is reached, so a large file is never
/// decoded past the point where the budget is exhausted. Only nodes carry a
/// direct coordinate; ways and relations are skipped.
pub fn extract_pbf<R: Read>(
    source: R,
    opts: &ExtractOptions,
    cap: usize,
) -> Result<Vec<PoiRecord>> {
    let mut pbf = OsmPbfReader::new(source);
    let entities = pbf.iter().filter_map(|obj| match obj {
        Ok(OsmObj::Node(node)) => {
            let mut tags = TagSet::new();
            for (key, value) in node.tags.iter() {
                tags.insert(key.to_string(), value.to_string());
            }
            Some(Ok(RawEntity {
                id: node.id.0,
                lat: node.lat(),
                lon: node.lon(),
                tags,
            }))
        }
        Ok(_) => None,
        Err(err) => Some(Err(Error::Parse(err.to_string()))),
    });
    drive(entities, opts, cap)
}
