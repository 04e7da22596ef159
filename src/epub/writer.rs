use std::io::{Seek, Write};
use std::path::Path;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::book::{Book, MetaItem, NavPoint};
use crate::error::Result;
use crate::metadata::BOOK_ID_ATTR;
use crate::util::escape_xml;

/// Packaging options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpubConfig {
    /// Deflate level for everything but `mimetype`; `None` uses the zip default.
    pub compression_level: Option<i64>,
}

/// Write a [`Book`] to an EPUB file on disk.
///
/// The package is written to a temporary file next to `path` and renamed
/// into place, so a failed run never leaves a partial file behind.
pub fn write_epub<P: AsRef<Path>>(book: &Book, path: P) -> Result<()> {
    write_epub_with_config(book, path, &EpubConfig::default())
}

/// [`write_epub`] with explicit packaging options.
pub fn write_epub_with_config<P: AsRef<Path>>(
    book: &Book,
    path: P,
    config: &EpubConfig,
) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".leafpress-")
        .suffix(".epub.tmp")
        .tempfile_in(dir)?;
    write_epub_to_writer(book, tmp.as_file_mut(), config)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    log::info!("Wrote {}", path.display());
    Ok(())
}

/// Write a [`Book`] to any [`Write`] + [`Seek`] destination and hand the
/// destination back.
pub fn write_epub_to_writer<W: Write + Seek>(
    book: &Book,
    writer: W,
    config: &EpubConfig,
) -> Result<W> {
    let mut zip = ZipWriter::new(writer);

    // 1. Write mimetype (must be first, uncompressed)
    let options_stored =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let options_deflate = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(config.compression_level);

    zip.start_file("mimetype", options_stored)?;
    zip.write_all(b"application/epub+zip")?;

    // 2. Write META-INF/container.xml
    zip.start_file("META-INF/container.xml", options_deflate)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    // 3. Write content.opf
    let opf = generate_opf(book);
    zip.start_file("OEBPS/content.opf", options_deflate)?;
    zip.write_all(opf.as_bytes())?;

    // 4. Write toc.ncx
    let ncx = generate_ncx(book);
    zip.start_file("OEBPS/toc.ncx", options_deflate)?;
    zip.write_all(ncx.as_bytes())?;

    // 5. Write all manifest items
    for item in &book.manifest {
        let path = format!("OEBPS/{}", item.href);
        zip.start_file(&path, options_deflate)?;
        zip.write_all(&item.data)?;
    }

    log::debug!(
        "Packaged {} items, {} spine entries, {} navpoints",
        book.manifest.len(),
        book.spine.len(),
        book.nav_points().len()
    );
    Ok(zip.finish()?)
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

fn generate_opf(book: &Book) -> String {
    let mut opf = String::new();

    opf.push_str(&format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="{BOOK_ID_ATTR}">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
"#
    ));

    for item in &book.metadata.items {
        write_meta_item(&mut opf, item);
    }

    opf.push_str("  </metadata>\n  <manifest>\n");

    // NCX item
    opf.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
    );

    for item in &book.manifest {
        opf.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"/>\n",
            escape_xml(&item.id),
            escape_xml(&item.href),
            escape_xml(&item.media_type)
        ));
    }

    opf.push_str("  </manifest>\n  <spine toc=\"ncx\">\n");

    for entry in &book.spine {
        let linear = if entry.linear { "" } else { " linear=\"no\"" };
        opf.push_str(&format!(
            "    <itemref idref=\"{}\"{}/>\n",
            escape_xml(&entry.idref),
            linear
        ));
    }

    opf.push_str("  </spine>\n");

    if !book.guide.is_empty() {
        opf.push_str("  <guide>\n");
        for entry in &book.guide {
            opf.push_str(&format!(
                "    <reference href=\"{}\" type=\"{}\" title=\"{}\"/>\n",
                escape_xml(&entry.href),
                entry.kind.as_str(),
                escape_xml(&entry.title)
            ));
        }
        opf.push_str("  </guide>\n");
    }

    opf.push_str("</package>\n");
    opf
}

fn write_meta_item(opf: &mut String, item: &MetaItem) {
    let mut attrs = String::new();
    for (key, value) in &item.attributes {
        attrs.push_str(&format!(" {}=\"{}\"", key, escape_xml(value)));
    }
    match &item.text {
        Some(text) => opf.push_str(&format!(
            "    <{name}{attrs}>{}</{name}>\n",
            escape_xml(text),
            name = item.name
        )),
        None => opf.push_str(&format!("    <{}{}/>\n", item.name, attrs)),
    }
}

fn generate_ncx(book: &Book) -> String {
    let mut ncx = String::new();
    let identifier = book.metadata.unique_identifier().unwrap_or_default();
    let title = book.metadata.title().unwrap_or_default();

    ncx.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
"#,
    );
    ncx.push_str(&format!(
        "    <meta name=\"dtb:uid\" content=\"{}\"/>\n",
        escape_xml(identifier)
    ));
    ncx.push_str(&format!(
        "    <meta name=\"dtb:depth\" content=\"{}\"/>\n",
        book.nav_depth().max(1)
    ));
    ncx.push_str(
        r#"    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
    <text>"#,
    );
    ncx.push_str(&escape_xml(title));
    ncx.push_str("</text>\n  </docTitle>\n");

    for author in book.metadata.values("dc:creator") {
        ncx.push_str(&format!(
            "  <docAuthor>\n    <text>{}</text>\n  </docAuthor>\n",
            escape_xml(author)
        ));
    }

    ncx.push_str("  <navMap>\n");
    for point in &book.nav {
        write_nav_point(&mut ncx, point, 2);
    }
    ncx.push_str("  </navMap>\n</ncx>\n");
    ncx
}

fn write_nav_point(ncx: &mut String, point: &NavPoint, indent: usize) {
    let indent_str = "  ".repeat(indent);

    ncx.push_str(&format!(
        "{}<navPoint id=\"{}\" playOrder=\"{}\">\n",
        indent_str,
        escape_xml(&point.id),
        point.play_order
    ));
    ncx.push_str(&format!(
        "{}  <navLabel>\n{}    <text>{}</text>\n{}  </navLabel>\n",
        indent_str,
        indent_str,
        escape_xml(&point.label),
        indent_str
    ));
    ncx.push_str(&format!(
        "{}  <content src=\"{}\"/>\n",
        indent_str,
        escape_xml(&point.src)
    ));

    for child in &point.children {
        write_nav_point(ncx, child, indent + 1);
    }

    ncx.push_str(&format!("{}</navPoint>\n", indent_str));
}
