use anyhow::Result;
use chrono::{Local, NaiveDate, TimeZone};
use std::fmt::Display;
use std::path::Path;

use crate::core::io::Storage;
use crate::core::session::Note;

pub const KEY_POINT_MARKER: &str = "[КЛЮЧОВЕ] ";

/// One `[HH:MM:SS] [marker]content` line per note in list order, local time.
pub fn serialize_notes(notes: &[Note]) -> String {
    serialize_notes_in(notes, &Local)
}

pub fn serialize_notes_in<Tz>(notes: &[Note], tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    notes
        .iter()
        .map(|n| {
            format!(
                "[{}] {}{}",
                n.timestamp.with_timezone(tz).format("%H:%M:%S"),
                if n.is_key_point { KEY_POINT_MARKER } else { "" },
                n.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("sales_notes_{}.txt", date.format("%Y-%m-%d"))
}

/// Writes the serialized notes to `<folder>/sales_notes_<date>.txt` and
/// returns the path written.
pub async fn export_notes(
    storage: &dyn Storage,
    folder: &str,
    notes: &[Note],
    date: NaiveDate,
) -> Result<String> {
    let path = Path::new(folder).join(export_file_name(date));
    let path = path.to_string_lossy().to_string();
    storage.write(&path, serialize_notes(notes).as_bytes()).await?;
    log::info!("Exported {} notes to {}", notes.len(), path);
    Ok(path)
}
