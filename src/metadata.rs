//! Bibliographic metadata mapping.
//!
//! The bundle's `{id}_meta.xml` is a flat list of catalog fields under a
//! `metadata` root. Fields with a Dublin Core counterpart become `dc:` items
//! of the package metadata.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::book::{MetaItem, MetadataRecord};
use crate::error::{Error, Result};
use crate::language::normalize_language;
use crate::util::{local_name, resolve_entity};

/// Catalog fields copied into the package, in output order.
pub const DC_FIELDS: [&str; 15] = [
    "title",
    "creator",
    "subject",
    "description",
    "publisher",
    "contributor",
    "date",
    "type",
    "format",
    "identifier",
    "source",
    "language",
    "relation",
    "coverage",
    "rights",
];

/// Placeholder cover id; replaced with the real cover when the book is built.
pub const COVER_PLACEHOLDER: &str = "cover-image";

/// `id` attribute of the package's unique identifier.
pub const BOOK_ID_ATTR: &str = "bookid";

/// Map a catalog metadata document to package metadata.
///
/// `book_id` stands in for a missing identifier or title, so the package
/// always has both.
pub fn map_metadata(content: &str, book_id: &str) -> Result<MetadataRecord> {
    let fields = parse_fields(content)?;

    let mut record = MetadataRecord::new();
    record.push(
        MetaItem::empty("meta")
            .with_attribute("name", "cover")
            .with_attribute("content", COVER_PLACEHOLDER),
    );
    record.push(MetaItem::new("dc:type", "Text"));

    for field in DC_FIELDS {
        for (_, text) in fields.iter().filter(|(name, _)| name == field) {
            let element = format!("dc:{field}");
            match field {
                "identifier" => {
                    record.push(MetaItem::new(element, text).with_attribute("id", BOOK_ID_ATTR))
                }
                "language" => record.push(MetaItem::new(element, normalize_language(text))),
                // Already emitted above
                "type" if text == "Text" => continue,
                _ => record.push(MetaItem::new(element, text)),
            }
        }
    }

    if record.unique_identifier().is_none() {
        log::debug!("No identifier in metadata; using book id {book_id}");
        record.push(MetaItem::new("dc:identifier", book_id).with_attribute("id", BOOK_ID_ATTR));
    }
    if record.title().is_none() {
        log::warn!("No title in metadata; using book id {book_id}");
        record.push(MetaItem::new("dc:title", book_id));
    }
    if record.first("dc:language").is_none() {
        record.push(MetaItem::new("dc:language", "en"));
    }

    Ok(record)
}

/// Direct children of the root as (local name, trimmed text), skipping empty
/// fields.
fn parse_fields(content: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);

    let mut fields = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<String> = None;
    let mut buf_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                if depth == 2 {
                    let name = e.name();
                    current = Some(String::from_utf8_lossy(local_name(name.as_ref())).into_owned());
                    buf_text.clear();
                }
            }
            Ok(Event::Text(e)) => {
                if current.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::CData(e)) => {
                if current.is_some() {
                    buf_text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if current.is_some()
                    && let Some(c) = resolve_entity(&String::from_utf8_lossy(e.as_ref()))
                {
                    buf_text.push(c);
                }
            }
            Ok(Event::End(_)) => {
                if depth == 2
                    && let Some(name) = current.take()
                {
                    let text = buf_text.trim();
                    if text.is_empty() {
                        log::debug!("Skipping empty metadata field <{name}>");
                    } else {
                        fields.push((name, text.to_string()));
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(e)),
            _ => {}
        }
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    const META: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata>
  <identifier>adventuresofsher00doyl</identifier>
  <title>The Adventures of Sherlock Holmes</title>
  <creator>Doyle, Arthur Conan</creator>
  <creator>Paget, Sidney</creator>
  <type>Text</type>
  <type>Book</type>
  <language>eng</language>
  <mediatype>texts</mediatype>
  <publisher>Harper &amp; Brothers</publisher>
  <description></description>
</metadata>"#;

    fn names(record: &MetadataRecord) -> Vec<&str> {
        record.items.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn test_fixed_leading_items() {
        let record = map_metadata(META, "x").unwrap();
        assert_eq!(record.items[0].name, "meta");
        assert_eq!(record.cover_hint(), Some(COVER_PLACEHOLDER));
        assert_eq!(record.items[1], MetaItem::new("dc:type", "Text"));
    }

    #[test]
    fn test_fields_follow_dc_order() {
        let record = map_metadata(META, "x").unwrap();
        assert_eq!(
            names(&record),
            vec![
                "meta",
                "dc:type",
                "dc:title",
                "dc:creator",
                "dc:creator",
                "dc:publisher",
                "dc:type",
                "dc:identifier",
                "dc:language",
            ]
        );
        let creators: Vec<_> = record.values("dc:creator").collect();
        assert_eq!(creators, vec!["Doyle, Arthur Conan", "Paget, Sidney"]);
        assert_eq!(record.first("dc:publisher"), Some("Harper & Brothers"));
    }

    #[test]
    fn test_special_cases() {
        let record = map_metadata(META, "x").unwrap();
        // Duplicate "Text" dropped, other types kept
        let types: Vec<_> = record.values("dc:type").collect();
        assert_eq!(types, vec!["Text", "Book"]);
        assert_eq!(record.unique_identifier(), Some("adventuresofsher00doyl"));
        assert_eq!(record.first("dc:language"), Some("en"));
    }

    #[test]
    fn test_fallbacks_use_book_id() {
        let record = map_metadata("<metadata><mediatype>texts</mediatype></metadata>", "book01").unwrap();
        assert_eq!(record.unique_identifier(), Some("book01"));
        assert_eq!(record.title(), Some("book01"));
        assert_eq!(record.first("dc:language"), Some("en"));
    }
}
