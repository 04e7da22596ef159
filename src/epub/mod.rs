mod writer;

pub use writer::{EpubConfig, write_epub, write_epub_to_writer, write_epub_with_config};
