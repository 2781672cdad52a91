use std::io;
use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::ProjectedPost;

/// Write posts to `path` as newline-delimited JSON, one object per line.
///
/// The file is truncated first, so the result only ever holds this batch.
/// Returns the number of lines written.
pub async fn write_lines<'a>(
    path: impl AsRef<Path>,
    posts: impl IntoIterator<Item = &'a ProjectedPost>,
) -> io::Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let mut buf = Vec::new();
    let mut count = 0;
    for post in posts {
        serde_json::to_writer(&mut buf, post)?;
        buf.push(b'\n');
        count += 1;
    }

    let mut file = fs::File::create(path).await?;
    file.write_all(&buf).await?;
    file.flush().await?;

    Ok(count)
}

/// Parse every line of a staged file back into a JSON value.
pub async fn read_lines(path: impl AsRef<Path>) -> io::Result<Vec<serde_json::Value>> {
    let contents = fs::read_to_string(path).await?;
    contents
        .lines()
        .map(|l| serde_json::from_str(l).map_err(io::Error::from))
        .collect()
}
