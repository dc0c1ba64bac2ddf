//! Parser for the store's `::`-delimited data files.
//!
//! - users.dat: userId
//! - items.dat: itemId::name
//! - features.dat: featureId::category
//! - user_features.dat / item_features.dat: entityId::featureId::weight
//! - interactions.dat: userId::itemId::rating::timestamp
//! - item_places.dat: itemId::latitude::longitude::openHour::closeHour

use crate::error::{DataLoadError, Result};
use crate::types::*;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::{FromStr, Split};

/// Read a file as lines, replacing invalid UTF-8 rather than failing.
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let bytes = fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DataLoadError::MissingFile(path.to_path_buf()),
        _ => DataLoadError::Io(e),
    })?;
    let content = String::from_utf8_lossy(&bytes);
    Ok(content.lines().map(|s| s.to_string()).collect())
}

/// Cursor over the fields of one line, carrying the context for errors.
struct Fields<'a> {
    parts: Split<'a, &'static str>,
    file: &'static str,
    line: usize,
}

impl<'a> Fields<'a> {
    fn new(line_text: &'a str, file: &'static str, line: usize) -> Self {
        Self {
            parts: line_text.split("::"),
            file,
            line,
        }
    }

    fn next_str(&mut self, name: &str) -> Result<&'a str> {
        self.parts.next().ok_or_else(|| DataLoadError::Malformed {
            file: self.file,
            line: self.line,
            reason: format!("Missing {}", name),
        })
    }

    fn next<T>(&mut self, name: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.next_str(name)?;
        raw.trim().parse().map_err(|e| DataLoadError::Malformed {
            file: self.file,
            line: self.line,
            reason: format!("Invalid {}: {}", name, e),
        })
    }
}

/// Iterate non-empty lines with their 1-based line numbers.
fn data_lines(lines: &[String]) -> impl Iterator<Item = (usize, &str)> {
    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

pub fn parse_users(path: &Path) -> Result<Vec<User>> {
    let lines = read_lines(path)?;
    let mut users = Vec::new();
    for (line_no, line) in data_lines(&lines) {
        let mut fields = Fields::new(line, "users.dat", line_no);
        users.push(User {
            id: fields.next("userId")?,
        });
    }
    Ok(users)
}

pub fn parse_items(path: &Path) -> Result<Vec<Item>> {
    let lines = read_lines(path)?;
    let mut items = Vec::new();
    for (line_no, line) in data_lines(&lines) {
        let mut fields = Fields::new(line, "items.dat", line_no);
        let id = fields.next("itemId")?;
        // The name is optional; items can be registered before they are described.
        let name = fields.next_str("name").unwrap_or("").to_string();
        items.push(Item { id, name });
    }
    Ok(items)
}

pub fn parse_features(path: &Path) -> Result<Vec<Feature>> {
    let lines = read_lines(path)?;
    let mut features = Vec::new();
    for (line_no, line) in data_lines(&lines) {
        let mut fields = Fields::new(line, "features.dat", line_no);
        features.push(Feature {
            id: fields.next("featureId")?,
            category: fields.next_str("category")?.to_string(),
        });
    }
    Ok(features)
}

/// Parse `entityId::featureId::weight` rows (user_features.dat or item_features.dat).
pub fn parse_feature_weights(path: &Path, file: &'static str) -> Result<Vec<(u32, FeatureWeight)>> {
    let lines = read_lines(path)?;
    let mut rows = Vec::new();
    for (line_no, line) in data_lines(&lines) {
        let mut fields = Fields::new(line, file, line_no);
        let entity: u32 = fields.next("entityId")?;
        let feature_id: FeatureId = fields.next("featureId")?;
        let weight: f32 = fields.next("weight")?;
        rows.push((entity, FeatureWeight { feature_id, weight }));
    }
    Ok(rows)
}

pub fn parse_interactions(path: &Path) -> Result<Vec<Interaction>> {
    let lines = read_lines(path)?;
    let mut interactions = Vec::new();
    for (line_no, line) in data_lines(&lines) {
        let mut fields = Fields::new(line, "interactions.dat", line_no);
        interactions.push(Interaction {
            user_id: fields.next("userId")?,
            item_id: fields.next("itemId")?,
            rating: fields.next("rating")?,
            timestamp: fields.next("timestamp")?,
        });
    }
    Ok(interactions)
}

pub fn parse_item_places(path: &Path) -> Result<Vec<ItemPlace>> {
    let lines = read_lines(path)?;
    let mut places = Vec::new();
    for (line_no, line) in data_lines(&lines) {
        let mut fields = Fields::new(line, "item_places.dat", line_no);
        let place = ItemPlace {
            item_id: fields.next("itemId")?,
            latitude: fields.next("latitude")?,
            longitude: fields.next("longitude")?,
            open_hour: fields.next("openHour")?,
            close_hour: fields.next("closeHour")?,
        };
        if place.open_hour > 23 || place.close_hour > 24 {
            return Err(DataLoadError::Malformed {
                file: "item_places.dat",
                line: line_no,
                reason: format!("Hours out of range: {}-{}", place.open_hour, place.close_hour),
            });
        }
        places.push(place);
    }
    Ok(places)
}

/// Write the interaction log back to disk.
///
/// The rows go to a temporary file in the same directory which is then
/// renamed over `path`, so readers never observe a half-written log.
pub fn write_interactions(path: &Path, interactions: &[Interaction]) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    for row in interactions {
        writeln!(
            tmp,
            "{}::{}::{}::{}",
            row.user_id, row.item_id, row.rating, row.timestamp
        )?;
    }
    tmp.flush()?;
    tmp.persist(path).map_err(|e| DataLoadError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_parse_interactions_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "interactions.dat", "1::10::5::100\n\n2::11::3.5::200\n");

        let rows = parse_interactions(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].item_id, 11);
        assert_eq!(rows[1].rating, 3.5);
    }

    #[test]
    fn test_parse_error_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "interactions.dat", "1::10::5::100\n1::abc::5::100\n");

        let err = parse_interactions(&path).unwrap_err();
        match err {
            DataLoadError::Malformed { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_item_places() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "item_places.dat", "10::-23.55::-46.63::18::2\n");

        let places = parse_item_places(&path).unwrap();
        assert_eq!(places[0].item_id, 10);
        assert_eq!(places[0].close_hour, 2);

        let bad = write_file(dir.path(), "bad_places.dat", "10::0.0::0.0::30::2\n");
        assert!(parse_item_places(&bad).is_err());
    }

    #[test]
    fn test_missing_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "features.dat", "3\n");
        assert!(matches!(
            parse_features(&path),
            Err(DataLoadError::Malformed { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = parse_users(Path::new("/definitely/not/here/users.dat")).unwrap_err();
        assert!(matches!(err, DataLoadError::MissingFile(_)));
    }

    #[test]
    fn test_item_name_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "items.dat", "7::Cafe Central\n8\n");
        let items = parse_items(&path).unwrap();
        assert_eq!(items[0].name, "Cafe Central");
        assert_eq!(items[1].name, "");
    }

    #[test]
    fn test_write_then_parse_interactions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interactions.dat");
        let rows = vec![Interaction {
            user_id: 4,
            item_id: 9,
            rating: 4.5,
            timestamp: 1700000000,
        }];

        write_interactions(&path, &rows).unwrap();
        assert_eq!(parse_interactions(&path).unwrap(), rows);
    }
}
