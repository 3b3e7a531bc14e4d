use std::fs::create_dir_all;
use std::fs::File;
use std::fs::OpenOptions;
use std::path::Path;

use crate::Result;

pub(crate) fn create_parent_dir_if_not_exist(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn open_file_for_append(path: &Path) -> Result<File> {
    create_parent_dir_if_not_exist(path)?;
    let log_file = OpenOptions::new().append(true).create(true).open(path)?;
    Ok(log_file)
}
