use actix_multipart::{Field, Multipart};
use actix_web::web::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum IngestError {
    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("upload stream failed: {0}")]
    Stream(String),
    #[error("expected exactly one file field, found none")]
    MissingFile,
    #[error("expected exactly one file field, found more")]
    MultipleFiles,
    #[error("malformed multipart body: {0}")]
    Multipart(String),
}

/// Reads the whole stream into one buffer, failing once more than `limit`
/// bytes have arrived.
pub async fn drain<S, E>(mut stream: S, limit: usize) -> Result<Vec<u8>, IngestError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let mut buffer = Vec::new();
    while let Some(chunk) = stream.next().await {
        let data = chunk.map_err(|e| IngestError::Stream(e.to_string()))?;
        if buffer.len() + data.len() > limit {
            return Err(IngestError::TooLarge { limit });
        }
        buffer.extend_from_slice(&data);
    }
    Ok(buffer)
}

/// Consumes a stream without keeping anything.
pub async fn discard<S, E>(mut stream: S) -> Result<(), IngestError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    while let Some(chunk) = stream.next().await {
        chunk.map_err(|e| IngestError::Stream(e.to_string()))?;
    }
    Ok(())
}

/// Returns the bytes of the only file part in `payload`. Plain form fields
/// are read and dropped.
pub async fn single_file(mut payload: Multipart, limit: usize) -> Result<Vec<u8>, IngestError> {
    let mut file = None;
    while let Some(item) = payload.next().await {
        let field = item.map_err(|e| IngestError::Multipart(e.to_string()))?;
        if !is_file(&field) {
            discard(field).await?;
            continue;
        }
        if file.is_some() {
            return Err(IngestError::MultipleFiles);
        }
        file = Some(drain(field, limit).await?);
    }
    file.ok_or(IngestError::MissingFile)
}

fn is_file(field: &Field) -> bool {
    field
        .content_disposition()
        .and_then(|cd| cd.get_filename())
        .is_some()
}
