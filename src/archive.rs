use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use log::debug;
use zip::ZipArchive;

use crate::error::{Error, Result};

pub fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|err| Error::open(path, err))
}

/// Opens an XML source for reading, transparently decompressing `.gz` and
/// `.bz2` files.
pub fn open_xml_source(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = open_file(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("gz") => Ok(Box::new(BufReader::new(GzDecoder::new(file)))),
        Some("bz2") => Ok(Box::new(BufReader::new(BzDecoder::new(file)))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

/// Unpacks a zip archive into `target` and returns the OSM files it
/// contained, sorted. Entries with unsafe paths are skipped.
pub fn expand_zip(path: &Path, target: &Path) -> Result<Vec<PathBuf>> {
    let file = open_file(path)?;
    let mut archive = ZipArchive::new(file).map_err(|err| Error::Archive(err.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| Error::Archive(err.to_string()))?;
        let Some(relative) = entry.enclosed_name().map(|name| name.to_path_buf()) else {
            continue;
        };
        let dest = target.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)?;
        io::copy(&mut entry, &mut out)?;
        debug!("unpacked {}", dest.display());
    }

    find_osm_files(target)
}

fn is_osm_file(name: &str) -> bool {
    name.ends_with(".osm")
        || name.ends_with(".xml")
        || name.ends_with(".osm.gz")
        || name.ends_with(".osm.bz2")
        || name.ends_with(".pbf")
}

/// Recursively collects OSM files below `dir`, in sorted order so repeated
/// runs process them the same way.
pub fn find_osm_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in dir.read_dir()? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, files)?;
        } else if path
            .file_name()
            .and_then(|name| name.to_str())
            .map(is_osm_file)
            .unwrap_or(false)
        {
            files.push(path);
        }
    }
    Ok(())
}
