use relay_abi::{ArgShape, Args, OwnedPayload, Value};
use smallvec::SmallVec;
use zeroize::Zeroize;

use crate::error::{CodecError, CodecResult, TruncationReason};

const TAG_INT: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_TEXT: u8 = 2;
const TAG_BYTES: u8 = 3;
const NULL_LEN: i32 = -1;

/// Limits and erase policy applied while marshalling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarshalOptions {
    /// Largest encoded payload accepted; anything bigger is reported as an
    /// allocation failure.
    pub max_payload_bytes: usize,
    /// Longest string accepted, in bytes.
    pub max_string_len: usize,
    /// Zero buffer contents before they are freed.
    pub secure_erase: bool,
}

impl Default for MarshalOptions {
    fn default() -> Self {
        Self {
            max_payload_bytes: 64 * 1024,
            max_string_len: 4096,
            secure_erase: false,
        }
    }
}

/// Number of bytes [`marshal`] writes for `args`.
pub fn encoded_len(args: &Args) -> usize {
    match args {
        Args::Void => 0,
        Args::Ints(values) => 4usize.saturating_add(values.len().saturating_mul(4)),
        Args::Strings(values) => values
            .iter()
            .fold(4usize, |acc, value| acc.saturating_add(text_len(value.as_deref()))),
        Args::Raw(bytes) => 4usize.saturating_add(bytes.len()),
        Args::Record(fields) => fields.iter().fold(2usize, |acc, field| {
            acc.saturating_add(1).saturating_add(match field {
                Value::Int(_) => 8,
                Value::Bool(_) => 1,
                Value::Text(text) => text_len(text.as_deref()),
                Value::Bytes(bytes) => 4usize.saturating_add(bytes.len()),
            })
        }),
    }
}

fn text_len(text: Option<&str>) -> usize {
    match text {
        Some(text) => 5usize.saturating_add(text.len()),
        None => 4,
    }
}

/// Encodes `args` into a freshly allocated owned buffer.
///
/// `args` must match `shape`. The buffer is reserved once up front; a
/// reservation failure or an encoding larger than
/// [`MarshalOptions::max_payload_bytes`] yields
/// [`CodecError::AllocationFailed`].
pub fn marshal(
    shape: ArgShape,
    args: &Args,
    options: &MarshalOptions,
) -> CodecResult<OwnedPayload> {
    if !shape.accepts(args) {
        return Err(CodecError::ShapeMismatch);
    }
    let requested = encoded_len(args);
    if requested > options.max_payload_bytes {
        return Err(CodecError::AllocationFailed { requested });
    }

    let mut writer = Writer::with_capacity(requested, options)?;
    match args {
        Args::Void => {}
        Args::Ints(values) => {
            writer.put_count(values.len())?;
            for value in values {
                writer.put(&value.to_le_bytes());
            }
        }
        Args::Strings(values) => {
            writer.put_count(values.len())?;
            for (index, value) in values.iter().enumerate() {
                writer.put_text(index, value.as_deref())?;
            }
        }
        Args::Raw(bytes) => {
            writer.put_count(bytes.len())?;
            writer.put(bytes);
        }
        Args::Record(fields) => {
            let count = u16::try_from(fields.len()).map_err(|_| CodecError::ShapeMismatch)?;
            writer.put(&count.to_le_bytes());
            for (index, field) in fields.iter().enumerate() {
                match field {
                    Value::Int(value) => {
                        writer.put(&[TAG_INT]);
                        writer.put(&value.to_le_bytes());
                    }
                    Value::Bool(value) => {
                        writer.put(&[TAG_BOOL, u8::from(*value)]);
                    }
                    Value::Text(text) => {
                        writer.put(&[TAG_TEXT]);
                        writer.put_text(index, text.as_deref())?;
                    }
                    Value::Bytes(bytes) => {
                        writer.put(&[TAG_BYTES]);
                        writer.put_count(bytes.len())?;
                        writer.put(bytes);
                    }
                }
            }
        }
    }
    Ok(OwnedPayload::new(writer.finish(), options.secure_erase))
}

/// Decodes a buffer produced by [`marshal`] back into typed arguments.
pub fn unmarshal(shape: ArgShape, bytes: &[u8]) -> CodecResult<Args> {
    let mut reader = Reader { bytes, pos: 0 };
    let args = match shape {
        ArgShape::Void => Args::Void,
        ArgShape::Ints(_) => {
            let count = reader.u32()?;
            let mut values = SmallVec::new();
            for _ in 0..count {
                values.push(reader.i32()?);
            }
            Args::Ints(values)
        }
        ArgShape::Strings(_) => {
            let count = reader.u32()?;
            let mut values = SmallVec::new();
            for _ in 0..count {
                values.push(reader.text()?);
            }
            Args::Strings(values)
        }
        ArgShape::Raw => {
            let len = reader.u32()? as usize;
            Args::Raw(reader.take(len)?.to_vec())
        }
        ArgShape::Record(_) => {
            let count = u16::from_le_bytes(reader.array()?);
            let mut fields = Vec::new();
            for _ in 0..count {
                let at = reader.pos;
                let field = match reader.array::<1>()?[0] {
                    TAG_INT => Value::Int(i64::from_le_bytes(reader.array()?)),
                    TAG_BOOL => match reader.array::<1>()?[0] {
                        0 => Value::Bool(false),
                        1 => Value::Bool(true),
                        _ => return Err(CodecError::Malformed { offset: at + 1 }),
                    },
                    TAG_TEXT => Value::Text(reader.text()?),
                    TAG_BYTES => {
                        let len = reader.u32()? as usize;
                        Value::Bytes(reader.take(len)?.to_vec())
                    }
                    _ => return Err(CodecError::Malformed { offset: at }),
                };
                fields.push(field);
            }
            Args::Record(fields)
        }
    };
    if reader.pos != bytes.len() {
        return Err(CodecError::Malformed { offset: reader.pos });
    }
    if !shape.accepts(&args) {
        return Err(CodecError::ShapeMismatch);
    }
    Ok(args)
}

struct Writer {
    buf: Vec<u8>,
    max_string_len: usize,
    secure_erase: bool,
}

impl Writer {
    fn with_capacity(requested: usize, options: &MarshalOptions) -> CodecResult<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(requested)
            .map_err(|_| CodecError::AllocationFailed { requested })?;
        Ok(Self {
            buf,
            max_string_len: options.max_string_len,
            secure_erase: options.secure_erase,
        })
    }

    fn put(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn put_count(&mut self, count: usize) -> CodecResult<()> {
        let count = u32::try_from(count).map_err(|_| CodecError::AllocationFailed {
            requested: count,
        })?;
        self.put(&count.to_le_bytes());
        Ok(())
    }

    fn put_text(&mut self, index: usize, text: Option<&str>) -> CodecResult<()> {
        let Some(text) = text else {
            self.put(&NULL_LEN.to_le_bytes());
            return Ok(());
        };
        if let Some(at) = text.bytes().position(|b| b == 0) {
            return Err(CodecError::Truncated {
                index,
                reason: TruncationReason::InteriorNul { at },
            });
        }
        let too_long = CodecError::Truncated {
            index,
            reason: TruncationReason::TooLong {
                len: text.len(),
                limit: self.max_string_len,
            },
        };
        if text.len() > self.max_string_len {
            return Err(too_long);
        }
        let len = i32::try_from(text.len()).map_err(|_| too_long)?;
        self.put(&len.to_le_bytes());
        self.put(text.as_bytes());
        self.put(&[0]);
        Ok(())
    }

    fn finish(mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if self.secure_erase {
            self.buf.zeroize();
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(CodecError::Malformed { offset: self.pos })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let at = self.pos;
        self.take(N)?
            .try_into()
            .map_err(|_| CodecError::Malformed { offset: at })
    }

    fn u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn i32(&mut self) -> CodecResult<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    fn text(&mut self) -> CodecResult<Option<String>> {
        let at = self.pos;
        let len = self.i32()?;
        if len == NULL_LEN {
            return Ok(None);
        }
        let len = usize::try_from(len).map_err(|_| CodecError::Malformed { offset: at })?;
        let body = self.take(len)?;
        let terminator = self.pos;
        if self.array::<1>()? != [0] {
            return Err(CodecError::Malformed { offset: terminator });
        }
        let text = std::str::from_utf8(body).map_err(|_| CodecError::Malformed { offset: at })?;
        Ok(Some(text.to_owned()))
    }
}
