//! KMZ extraction and KML markup parsing.
//!
//! A KMZ is a zip archive wrapping a single KML document of point
//! placemarks. The archive is unpacked into a transient workspace
//! ([`tempfile::TempDir`]) that is released on every exit path, the KML
//! document is located deterministically, and each placemark becomes one
//! [`SiteRecord`].

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use geo_types::Point;
use quick_xml::events::Event;
use quick_xml::Reader;
use tempfile::TempDir;
use tracing::info;
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::model::SiteRecord;

/// Reads every placemark from a KMZ archive.
///
/// Exactly one `.kml` document must be present; zero candidates and
/// ambiguous multiples both fail with [`Error::Format`]. A placemark
/// without a parseable point geometry fails with [`Error::Geometry`].
pub fn read_sites(kmz_path: &Path) -> Result<Vec<SiteRecord>> {
    if !kmz_path.exists() {
        return Err(Error::NotFound(kmz_path.to_path_buf()));
    }

    let file = File::open(kmz_path)?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| Error::Format(format!("{} is not a zip archive: {e}", kmz_path.display())))?;

    // Scoped workspace: dropped (and deleted) on success and on every error
    // path below.
    let workspace = TempDir::new()?;
    archive.extract(workspace.path())?;

    let kml_path = locate_kml_document(workspace.path())?;
    info!("parsing markup document {:?}", kml_path.file_name());

    let content = fs::read_to_string(&kml_path)?;
    let sites = parse_kml(&content)?;
    info!("parsed {} site records", sites.len());
    Ok(sites)
}

/// Finds the single KML document under the extraction workspace.
///
/// Candidates are collected recursively and sorted by path so discovery is
/// deterministic. Ambiguity fails loudly rather than silently picking the
/// first match.
fn locate_kml_document(dir: &Path) -> Result<PathBuf> {
    let mut candidates = Vec::new();
    collect_kml_files(dir, &mut candidates)?;
    candidates.sort();

    match candidates.len() {
        0 => Err(Error::Format(
            "archive contains no KML markup document".to_string(),
        )),
        1 => Ok(candidates.remove(0)),
        n => Err(Error::Format(format!(
            "archive is ambiguous: {n} KML documents ({})",
            candidates
                .iter()
                .map(|p| p.file_name().unwrap_or_default().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

fn collect_kml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_kml_files(&path, out)?;
        } else if path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("kml"))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Streaming KML parser: one [`SiteRecord`] per `<Placemark>`.
///
/// Captures `name`, `description` (text or CDATA; entity-encoded markup is
/// unescaped so embedded tables stay parseable) and `Point/coordinates`.
pub fn parse_kml(content: &str) -> Result<Vec<SiteRecord>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut sites = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut in_placemark = false;
    let mut name = String::new();
    let mut description = String::new();
    let mut coordinates: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                if tag == "placemark" {
                    in_placemark = true;
                    name.clear();
                    description.clear();
                    coordinates = None;
                }
                stack.push(tag);
            }
            Event::End(e) => {
                let tag = String::from_utf8_lossy(e.local_name().as_ref()).to_lowercase();
                if tag == "placemark" && in_placemark {
                    let point = parse_coordinates(coordinates.as_deref(), &name)?;
                    sites.push(SiteRecord {
                        name: name.trim().to_string(),
                        description: description.clone(),
                        point,
                    });
                    in_placemark = false;
                }
                // Lenient pop: KML in the wild sometimes drops a close tag.
                if stack.last().map(String::as_str) == Some(tag.as_str()) {
                    stack.pop();
                } else if let Some(pos) = stack.iter().rposition(|t| t == &tag) {
                    stack.truncate(pos);
                }
            }
            Event::Text(t) => {
                if in_placemark {
                    let text = t.unescape().map_err(Error::Xml)?;
                    capture(&stack, &text, &mut name, &mut description, &mut coordinates);
                }
            }
            Event::CData(c) => {
                if in_placemark {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    capture(&stack, &text, &mut name, &mut description, &mut coordinates);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(sites)
}

/// Routes text content by element context. `name` and `description` are
/// taken as direct children of the placemark so nested `ExtendedData`
/// labels do not bleed in.
fn capture(
    stack: &[String],
    text: &str,
    name: &mut String,
    description: &mut String,
    coordinates: &mut Option<String>,
) {
    let Some(top) = stack.last() else { return };
    let parent = stack.len().checked_sub(2).map(|i| stack[i].as_str());
    match top.as_str() {
        "name" if parent == Some("placemark") => name.push_str(text),
        "description" if parent == Some("placemark") => description.push_str(text),
        "coordinates" if parent == Some("point") => {
            *coordinates = Some(text.trim().to_string());
        }
        _ => {}
    }
}

/// Parses a KML `lon,lat[,alt]` coordinate string into a point.
fn parse_coordinates(raw: Option<&str>, site_name: &str) -> Result<Point<f64>> {
    let raw = raw.ok_or_else(|| {
        Error::Geometry(format!("placemark '{site_name}' has no point geometry"))
    })?;
    let mut parts = raw.split(',').map(str::trim);
    let lon = parts.next().and_then(|s| s.parse::<f64>().ok());
    let lat = parts.next().and_then(|s| s.parse::<f64>().ok());
    match (lon, lat) {
        (Some(lon), Some(lat)) if lon.is_finite() && lat.is_finite() => {
            Ok(Point::new(lon, lat))
        }
        _ => Err(Error::Geometry(format!(
            "placemark '{site_name}' has unparseable coordinates '{raw}'"
        ))),
    }
}
