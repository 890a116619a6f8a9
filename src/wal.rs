use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Frame one event as `[u32 len][bincode payload][u32 crc32]`, little-endian.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

enum Frame {
    Event(Event),
    /// Clean end of file.
    End,
    /// Torn or corrupt tail: a crash mid-write. Everything from here on is dropped.
    Damaged,
}

fn read_u32(reader: &mut impl Read) -> io::Result<Option<u32>> {
    let mut buf = [0u8; 4];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(u32::from_le_bytes(buf))),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

fn decode_frame(reader: &mut impl Read) -> io::Result<Frame> {
    let Some(len) = read_u32(reader)? else {
        return Ok(Frame::End);
    };
    let mut payload = vec![0u8; len as usize];
    match reader.read_exact(&mut payload) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Frame::Damaged),
        Err(e) => return Err(e),
    }
    let Some(stored_crc) = read_u32(reader)? else {
        return Ok(Frame::Damaged);
    };
    if stored_crc != crc32fast::hash(&payload) {
        return Ok(Frame::Damaged);
    }
    Ok(match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Frame::Event(event),
        Err(_) => Frame::Damaged,
    })
}

/// Append-only log of roster and reservation events; the durable copy of the engine state.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer an event; it is durable only after the next [`Wal::flush_sync`].
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write a compacted log next to `path`. Slow; the swap is separate.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path.with_extension("wal.tmp"))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted file over the log and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(self.path.with_extension("wal.tmp"), &self.path)?;
        *self = Self::open(&self.path.clone())?;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Read every intact event. A missing file is an empty log; a damaged tail is dropped.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        loop {
            match decode_frame(&mut reader)? {
                Frame::Event(event) => events.push(event),
                Frame::End => break,
                Frame::Damaged => {
                    tracing::warn!(
                        "{}: damaged tail after {} events discarded",
                        path.display(),
                        events.len()
                    );
                    break;
                }
            }
        }
        Ok(events)
    }
}
