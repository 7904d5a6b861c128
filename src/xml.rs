use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Error, Result};
use crate::model::{RawEntity, TagSet};

/// Streaming iterator over the `node` elements of an OSM XML document.
///
/// Memory stays bounded to the single in-flight entity: each event buffer is
/// cleared before the next read and finished entities are handed off
/// immediately. Ways and relations carry tags but no direct coordinate, so
/// they are skipped entirely; their `tag` children never attach to an entity
/// because no entity is pending while one is open.
pub struct XmlEntities<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    pending: Option<RawEntity>,
    done: bool,
}

impl<R: BufRead> XmlEntities<R> {
    pub fn new(source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            pending: None,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for XmlEntities<R> {
    type Item = Result<RawEntity>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf) {
                Ok(event) => event,
                Err(err) => {
                    self.done = true;
                    return Some(Err(Error::Parse(err.to_string())));
                }
            };
            match event {
                Event::Eof => {
                    self.done = true;
                    return None;
                }
                Event::Start(e) => match e.name().as_ref() {
                    b"node" => match node_from_attrs(&e) {
                        Ok(entity) => self.pending = entity,
                        Err(err) => {
                            self.done = true;
                            return Some(Err(err));
                        }
                    },
                    b"way" | b"relation" => self.pending = None,
                    b"tag" => {
                        if let Err(err) = attach_tag(&mut self.pending, &e) {
                            self.done = true;
                            return Some(Err(err));
                        }
                    }
                    _ => {}
                },
                Event::Empty(e) => match e.name().as_ref() {
                    b"node" => match node_from_attrs(&e) {
                        Ok(Some(entity)) => return Some(Ok(entity)),
                        Ok(None) => {}
                        Err(err) => {
                            self.done = true;
                            return Some(Err(err));
                        }
                    },
                    b"tag" => {
                        if let Err(err) = attach_tag(&mut self.pending, &e) {
                            self.done = true;
                            return Some(Err(err));
                        }
                    }
                    _ => {}
                },
                Event::End(e) => {
                    if e.name().as_ref() == b"node" {
                        if let Some(entity) = self.pending.take() {
                            return Some(Ok(entity));
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

fn get_attr(event: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in event.attributes().with_checks(false) {
        let attr = attr.map_err(|err| Error::Parse(err.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|err| Error::Parse(err.to_string()))?;
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

/// Nodes missing id, lat or lon never materialize as entities. Unparsable
/// coordinate text is treated the same way, a drop rather than an error.
fn node_from_attrs(event: &BytesStart<'_>) -> Result<Option<RawEntity>> {
    let id = get_attr(event, b"id")?.and_then(|value| value.parse::<i64>().ok());
    let lat = get_attr(event, b"lat")?.and_then(|value| value.parse::<f64>().ok());
    let lon = get_attr(event, b"lon")?.and_then(|value| value.parse::<f64>().ok());
    match (id, lat, lon) {
        (Some(id), Some(lat), Some(lon)) => Ok(Some(RawEntity {
            id,
            lat,
            lon,
            tags: TagSet::new(),
        })),
        _ => Ok(None),
    }
}

fn attach_tag(pending: &mut Option<RawEntity>, event: &BytesStart<'_>) -> Result<()> {
    let Some(entity) = pending.as_mut() else {
        return Ok(());
    };
    if let (Some(key), Some(value)) = (get_attr(event, b"k")?, get_attr(event, b"v")?) {
        entity.tags.insert(key, value);
    }
    Ok(())
}
