use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::client::Http;
use crate::crawler::{run_all, FanOutStats};
use crate::error::Result;

/// Download trial audio for each (album_id, track_id, url) triple into
/// `dir`, one task per track. Filenames are keyed by album and track id
/// so workers never collide; an existing file is overwritten.
pub async fn download_tracks(
    http: Arc<Http>,
    tracks: Vec<(i64, i64, String)>,
    dir: &Path,
    workers: usize,
) -> Result<FanOutStats> {
    tokio::fs::create_dir_all(dir).await?;
    let dir = dir.to_path_buf();

    let (_, stats) = run_all(
        tracks,
        workers,
        |(album_id, track_id, _)| format!("download {album_id}_{track_id}"),
        move |(album_id, track_id, url)| {
            let http = Arc::clone(&http);
            let path = dir.join(format!("{album_id}_{track_id}.m4a"));
            async move {
                let bytes = http.get_bytes(&url).await?;
                tokio::fs::write(&path, &bytes).await?;
                Ok(path)
            }
        },
        |path| {
            info!(path = %path.display(), "downloaded track");
            Ok(())
        },
    )
    .await?;

    Ok(stats)
}
