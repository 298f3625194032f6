//! Small shared utilities

pub mod path;

pub use path::get_data_dir;
