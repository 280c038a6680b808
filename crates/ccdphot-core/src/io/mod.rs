pub mod collection;
pub mod fits;
pub mod table;

pub use collection::{load_frame_set, CollectionEntry, ImageCollection};
pub use fits::{read_fits, write_fits, FitsHeader, FitsReader, HeaderValue};
pub use table::{to_csv, to_json, write_table, TableFormat};
