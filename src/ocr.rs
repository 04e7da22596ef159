//! Streaming reader for ABBYY FineReader OCR documents.
//!
//! OCR output for a whole book is large, so it is never materialized as a
//! tree. [`OcrPages`] pulls one `page` element at a time out of the stream and
//! hands it out as a small [`OcrPage`] value, which the caller drops before
//! asking for the next one.
//!
//! The structure kept per page is only what text extraction needs:
//!
//! ```text
//! page > block[blockType] > region | row | text > par > line > ... > charParams
//! ```

use std::io::{self, BufRead};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};
use crate::util::{local_name, resolve_entity};

/// One OCR page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OcrPage {
    pub blocks: Vec<OcrBlock>,
}

/// A layout block on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrBlock {
    pub block_type: BlockType,
    pub elements: Vec<BlockElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockType {
    Text,
    /// `Picture`, `Table`, `Separator`, ... kept verbatim.
    Other(String),
}

/// Child elements of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockElement {
    /// Block geometry; carries no text.
    Region,
    Text(Vec<Paragraph>),
    /// Table row; not extracted.
    Row,
    /// Anything else, by element name.
    Unknown(String),
}

/// An OCR paragraph: a sequence of line texts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    pub lines: Vec<String>,
}

impl OcrBlock {
    pub fn new(block_type: BlockType) -> Self {
        Self {
            block_type,
            elements: Vec::new(),
        }
    }
}

impl BlockType {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("Text") => BlockType::Text,
            Some(other) => BlockType::Other(other.to_string()),
            None => BlockType::Other(String::new()),
        }
    }
}

impl Paragraph {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    /// Lines joined with single spaces.
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }
}

/// Element names the reader distinguishes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Tag {
    Page,
    Block,
    Region,
    Text,
    Par,
    Line,
    Row,
    CharParams,
    Other(String),
}

impl Tag {
    fn from_name(name: &[u8]) -> Self {
        match local_name(name) {
            b"page" => Tag::Page,
            b"block" => Tag::Block,
            b"region" => Tag::Region,
            b"text" => Tag::Text,
            b"par" => Tag::Par,
            b"line" => Tag::Line,
            b"row" => Tag::Row,
            b"charParams" => Tag::CharParams,
            other => Tag::Other(String::from_utf8_lossy(other).into_owned()),
        }
    }

    fn name(&self) -> &str {
        match self {
            Tag::Page => "page",
            Tag::Block => "block",
            Tag::Region => "region",
            Tag::Text => "text",
            Tag::Par => "par",
            Tag::Line => "line",
            Tag::Row => "row",
            Tag::CharParams => "charParams",
            Tag::Other(name) => name,
        }
    }
}

/// Owned view of one parser event.
#[derive(Debug)]
enum Node {
    /// Opening tag, with the `blockType` attribute for blocks.
    Start(Tag, Option<String>),
    Empty(Tag, Option<String>),
    End,
    Text(String),
    Eof,
}

/// Forward-only iterator over the pages of an OCR document.
///
/// Finite and not restartable: after the end of the document or the first
/// error it yields nothing more.
pub struct OcrPages<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    done: bool,
}

impl<R: BufRead> OcrPages<R> {
    pub fn new(source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        // Whitespace inside charParams is content
        reader.config_mut().trim_text(false);
        Self {
            reader,
            buf: Vec::new(),
            done: false,
        }
    }

    fn next_node(&mut self) -> Result<Node> {
        self.buf.clear();
        let node = match self.reader.read_event_into(&mut self.buf)? {
            Event::Start(e) => {
                let tag = Tag::from_name(e.name().as_ref());
                let block_type = block_type_attr(&tag, &e)?;
                Node::Start(tag, block_type)
            }
            Event::Empty(e) => {
                let tag = Tag::from_name(e.name().as_ref());
                let block_type = block_type_attr(&tag, &e)?;
                Node::Empty(tag, block_type)
            }
            Event::End(_) => Node::End,
            Event::Text(e) => Node::Text(String::from_utf8_lossy(e.as_ref()).into_owned()),
            Event::CData(e) => Node::Text(String::from_utf8_lossy(e.as_ref()).into_owned()),
            Event::GeneralRef(e) => {
                let entity = String::from_utf8_lossy(e.as_ref());
                Node::Text(resolve_entity(&entity).map(String::from).unwrap_or_default())
            }
            Event::Eof => Node::Eof,
            _ => Node::Text(String::new()),
        };
        Ok(node)
    }

    /// Advance to the next `page` element and parse it.
    fn next_page(&mut self) -> Result<Option<OcrPage>> {
        loop {
            match self.next_node()? {
                Node::Start(Tag::Page, _) => return self.parse_page().map(Some),
                Node::Empty(Tag::Page, _) => return Ok(Some(OcrPage::default())),
                Node::Eof => return Ok(None),
                _ => {}
            }
        }
    }

    fn parse_page(&mut self) -> Result<OcrPage> {
        let mut page = OcrPage::default();
        loop {
            match self.next_node()? {
                Node::Start(Tag::Block, block_type) => {
                    let block = self.parse_block(BlockType::parse(block_type.as_deref()))?;
                    page.blocks.push(block);
                }
                Node::Empty(Tag::Block, block_type) => {
                    page.blocks
                        .push(OcrBlock::new(BlockType::parse(block_type.as_deref())));
                }
                Node::Start(..) => self.skip_element()?,
                Node::End => return Ok(page),
                Node::Eof => return Err(truncated("page")),
                _ => {}
            }
        }
    }

    fn parse_block(&mut self, block_type: BlockType) -> Result<OcrBlock> {
        let mut block = OcrBlock::new(block_type);
        loop {
            let element = match self.next_node()? {
                Node::Start(Tag::Text, _) => BlockElement::Text(self.parse_text()?),
                Node::Empty(Tag::Text, _) => BlockElement::Text(Vec::new()),
                Node::Start(tag, _) => {
                    self.skip_element()?;
                    block_element(tag)
                }
                Node::Empty(tag, _) => block_element(tag),
                Node::End => return Ok(block),
                Node::Eof => return Err(truncated("block")),
                Node::Text(_) => continue,
            };
            block.elements.push(element);
        }
    }

    fn parse_text(&mut self) -> Result<Vec<Paragraph>> {
        let mut paragraphs = Vec::new();
        loop {
            match self.next_node()? {
                Node::Start(Tag::Par, _) => paragraphs.push(self.parse_par()?),
                Node::Empty(Tag::Par, _) => paragraphs.push(Paragraph::default()),
                Node::Start(..) => self.skip_element()?,
                Node::End => return Ok(paragraphs),
                Node::Eof => return Err(truncated("text")),
                _ => {}
            }
        }
    }

    fn parse_par(&mut self) -> Result<Paragraph> {
        let mut par = Paragraph::default();
        loop {
            match self.next_node()? {
                Node::Start(Tag::Line, _) => par.lines.push(self.parse_line()?),
                Node::Empty(Tag::Line, _) => par.lines.push(String::new()),
                Node::Start(..) => self.skip_element()?,
                Node::End => return Ok(par),
                Node::Eof => return Err(truncated("par")),
                _ => {}
            }
        }
    }

    /// Collect the character data of a line.
    ///
    /// Whitespace-only text containing a line break is indentation and is
    /// dropped outside `charParams`; any other whitespace is content.
    fn parse_line(&mut self) -> Result<String> {
        let mut text = String::new();
        // One entry per open descendant: true for charParams
        let mut open: Vec<bool> = Vec::new();
        loop {
            match self.next_node()? {
                Node::Start(tag, _) => open.push(tag == Tag::CharParams),
                Node::Text(t) => {
                    let in_char = open.last().copied().unwrap_or(false);
                    let indentation = t.trim().is_empty() && t.contains(['\n', '\r']);
                    if in_char || !indentation {
                        text.push_str(&t);
                    }
                }
                Node::End => {
                    if open.pop().is_none() {
                        return Ok(text);
                    }
                }
                Node::Eof => return Err(truncated("line")),
                Node::Empty(..) => {}
            }
        }
    }

    /// Skip to the end of the element whose start tag was just read.
    fn skip_element(&mut self) -> Result<()> {
        let mut depth = 0usize;
        loop {
            match self.next_node()? {
                Node::Start(..) => depth += 1,
                Node::End if depth == 0 => return Ok(()),
                Node::End => depth -= 1,
                Node::Eof => return Err(truncated("element")),
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for OcrPages<R> {
    type Item = Result<OcrPage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_page() {
            Ok(Some(page)) => Some(Ok(page)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn block_type_attr(tag: &Tag, e: &BytesStart) -> Result<Option<String>> {
    if *tag != Tag::Block {
        return Ok(None);
    }
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"blockType" {
            return Ok(Some(String::from_utf8(attr.value.to_vec())?));
        }
    }
    Ok(None)
}

fn block_element(tag: Tag) -> BlockElement {
    match tag {
        Tag::Region => BlockElement::Region,
        Tag::Row => BlockElement::Row,
        other => BlockElement::Unknown(other.name().to_string()),
    }
}

fn truncated(inside: &str) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("OCR document ends inside <{inside}>"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABBYY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<document xmlns="http://www.abbyy.com/FineReader_xml/FineReader6-schema-v1.xml" version="1.0">
  <page width="2000" height="3000" resolution="400">
    <block blockType="Picture">
      <region><rect l="0" t="0" r="10" b="10"/></region>
    </block>
  </page>
  <page width="2000" height="3000" resolution="400">
    <block blockType="Text">
      <region><rect l="0" t="0" r="10" b="10"/></region>
      <text>
        <par align="Justified">
          <line baseline="10" l="0" t="0" r="10" b="10">
            <formatting lang="English"><charParams>I</charParams><charParams>t</charParams><charParams> </charParams><charParams>w</charParams><charParams>a</charParams><charParams>s</charParams></formatting>
          </line>
          <line baseline="20" l="0" t="0" r="10" b="10"><formatting lang="English">a dark &amp; stormy</formatting></line>
        </par>
        <par/>
      </text>
    </block>
    <block blockType="Table">
      <row><cell><text><par><line>cell</line></par></text></cell></row>
    </block>
  </page>
</document>"#;

    fn pages(xml: &str) -> Vec<Result<OcrPage>> {
        OcrPages::new(xml.as_bytes()).collect()
    }

    #[test]
    fn test_pages_streamed_in_order() {
        let pages: Vec<OcrPage> = pages(ABBYY).into_iter().map(|p| p.unwrap()).collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(
            pages[0].blocks[0].block_type,
            BlockType::Other("Picture".into())
        );
        assert_eq!(pages[0].blocks[0].elements, vec![BlockElement::Region]);
    }

    #[test]
    fn test_line_text_ignores_indentation() {
        let pages: Vec<OcrPage> = pages(ABBYY).into_iter().map(|p| p.unwrap()).collect();
        let block = &pages[1].blocks[0];
        assert_eq!(block.block_type, BlockType::Text);

        let BlockElement::Text(paragraphs) = &block.elements[1] else {
            panic!("expected text element, got {:?}", block.elements[1]);
        };
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].lines, vec!["It was", "a dark & stormy"]);
        assert_eq!(paragraphs[0].text(), "It was a dark & stormy");
        assert!(paragraphs[1].lines.is_empty());
    }

    #[test]
    fn test_line_keeps_inline_spaces() {
        let xml = r#"<document><page><block blockType="Text"><text><par>
            <line><formatting>The</formatting><formatting italic="true"> </formatting><formatting>end &amp; &amp; more</formatting></line>
        </par></text></block></page></document>"#;
        let pages: Vec<OcrPage> = pages(xml).into_iter().map(|p| p.unwrap()).collect();
        let BlockElement::Text(paragraphs) = &pages[0].blocks[0].elements[0] else {
            panic!("expected text element, got {:?}", pages[0].blocks[0].elements);
        };
        assert_eq!(paragraphs[0].lines, vec!["The end & & more"]);
    }

    #[test]
    fn test_table_rows_not_descended() {
        let pages: Vec<OcrPage> = pages(ABBYY).into_iter().map(|p| p.unwrap()).collect();
        assert_eq!(pages[1].blocks[1].elements, vec![BlockElement::Row]);
    }

    #[test]
    fn test_unknown_block_child_kept_by_name() {
        let xml = r#"<document><page><block blockType="Text"><separator/></block></page></document>"#;
        let page = pages(xml).remove(0).unwrap();
        assert_eq!(
            page.blocks[0].elements,
            vec![BlockElement::Unknown("separator".into())]
        );
    }

    #[test]
    fn test_truncated_document_errors_once() {
        let xml = r#"<document><page><block blockType="Text"><text><par><line>cut"#;
        let results = pages(xml);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }
}
