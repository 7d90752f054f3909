// Minimal reader for the SentencePiece ModelProto binary format.
//
// The model file is a protobuf message, but only one field matters here:
// the repeated `SentencePiece` entries (field 1) carrying piece text, score,
// and piece type. Everything else (trainer spec, normalizer spec, self-test
// data) is skipped wire-level, so no protobuf codegen or runtime dependency
// is needed to load a 128K-piece model.

use anyhow::{bail, Context, Result};

/// Piece type as declared in the model file. Only `Normal`, `UserDefined`,
/// and `Byte` pieces participate in segmentation matching; the rest are
/// placeholders whose IDs are claimed by the caller-supplied special tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceKind {
    Normal,
    Unknown,
    Control,
    UserDefined,
    Unused,
    Byte,
}

impl PieceKind {
    fn from_raw(value: u64) -> Result<Self> {
        Ok(match value {
            1 => PieceKind::Normal,
            2 => PieceKind::Unknown,
            3 => PieceKind::Control,
            4 => PieceKind::UserDefined,
            5 => PieceKind::Unused,
            6 => PieceKind::Byte,
            other => bail!("unsupported SentencePiece piece type: {other}"),
        })
    }

    /// Whether pieces of this kind may match text during segmentation.
    pub fn is_matchable(&self) -> bool {
        matches!(
            self,
            PieceKind::Normal | PieceKind::UserDefined | PieceKind::Byte
        )
    }
}

/// One vocabulary entry. The entry's position in [`ModelProto::pieces`] is
/// its token ID.
#[derive(Debug, Clone)]
pub struct PieceProto {
    pub piece: String,
    pub score: f32,
    pub kind: PieceKind,
}

/// The parsed model: the ordered piece table.
#[derive(Debug, Clone)]
pub struct ModelProto {
    pub pieces: Vec<PieceProto>,
}

impl ModelProto {
    /// Parse a serialized SentencePiece model.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(bytes);
        let mut pieces = Vec::new();

        while !reader.is_empty() {
            let (field, wire) = reader.read_key().context("malformed field key")?;
            if field == 1 && wire == WIRE_LEN_DELIMITED {
                let body = reader
                    .read_len_delimited()
                    .context("truncated SentencePiece entry")?;
                pieces.push(parse_piece(body)?);
            } else {
                reader
                    .skip(wire)
                    .with_context(|| format!("cannot skip field {field} (wire type {wire})"))?;
            }
        }

        if pieces.is_empty() {
            bail!("SentencePiece model contains no pieces");
        }

        Ok(ModelProto { pieces })
    }
}

fn parse_piece(bytes: &[u8]) -> Result<PieceProto> {
    let mut reader = WireReader::new(bytes);
    let mut piece = None;
    let mut score = 0.0f32;
    // Absent type field means NORMAL in the SentencePiece schema.
    let mut kind = PieceKind::Normal;

    while !reader.is_empty() {
        let (field, wire) = reader.read_key().context("malformed piece field key")?;
        match (field, wire) {
            (1, WIRE_LEN_DELIMITED) => {
                let raw = reader.read_len_delimited().context("truncated piece text")?;
                piece = Some(
                    String::from_utf8(raw.to_vec()).context("piece text is not valid UTF-8")?,
                );
            }
            (2, WIRE_FIXED32) => {
                score = reader.read_f32().context("truncated piece score")?;
            }
            (3, WIRE_VARINT) => {
                let raw = reader.read_varint().context("truncated piece type")?;
                kind = PieceKind::from_raw(raw)?;
            }
            (_, wire) => {
                reader.skip(wire).context("cannot skip unknown piece field")?;
            }
        }
    }

    let piece = piece.context("piece entry is missing its text")?;
    Ok(PieceProto { piece, score, kind })
}

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN_DELIMITED: u8 = 2;
const WIRE_FIXED32: u8 = 5;

struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn read_varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let Some(&byte) = self.buf.get(self.pos) else {
                bail!("varint runs past end of buffer");
            };
            self.pos += 1;
            if shift >= 64 {
                bail!("varint exceeds 64 bits");
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn read_key(&mut self) -> Result<(u32, u8)> {
        let key = self.read_varint()?;
        Ok(((key >> 3) as u32, (key & 0x07) as u8))
    }

    fn read_len_delimited(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .context("length-delimited field runs past end of buffer")?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_f32(&mut self) -> Result<f32> {
        let end = self.pos + 4;
        if end > self.buf.len() {
            bail!("fixed32 field runs past end of buffer");
        }
        let raw: [u8; 4] = self.buf[self.pos..end].try_into().expect("4-byte slice");
        self.pos = end;
        Ok(f32::from_le_bytes(raw))
    }

    fn skip(&mut self, wire: u8) -> Result<()> {
        match wire {
            WIRE_VARINT => {
                self.read_varint()?;
            }
            WIRE_FIXED64 => {
                let end = self.pos + 8;
                if end > self.buf.len() {
                    bail!("fixed64 field runs past end of buffer");
                }
                self.pos = end;
            }
            WIRE_LEN_DELIMITED => {
                self.read_len_delimited()?;
            }
            WIRE_FIXED32 => {
                self.read_f32()?;
            }
            other => bail!("unsupported wire type: {other}"),
        }
        Ok(())
    }
}
