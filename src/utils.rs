use std::{fs, io, path::Path};

pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

pub fn write_output(path: &Path, contents: &str) -> io::Result<()> {
    ensure_parent(path)?;
    fs::write(path, contents)
}
