// JSON rendering of the instruction stream.
//
// A delta is one top-level array of windows. Each window is an array of
// items: a string holds literal bytes (one char per byte, U+0000..U+00FF)
// and `[address, length]` is a COPY in the window's dictionary+target
// address space. The output is meant for inspection; it is far larger than
// the binary format.

use serde_json::{Value, json};

use super::decoder::DecoderLimits;
use super::{FormatError, Instruction};

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Writes windows as elements of a single JSON array.
#[derive(Debug, Default)]
pub struct JsonWriter {
    started: bool,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one window. `target` is the window's target bytes and
    /// `instructions` must describe it exactly.
    pub fn window(&mut self, instructions: &[Instruction], target: &[u8], out: &mut Vec<u8>) -> serde_json::Result<()> {
        out.push(if self.started { b',' } else { b'[' });
        self.started = true;

        let mut items = Vec::with_capacity(instructions.len());
        let mut pos = 0usize;
        for inst in instructions {
            let len = inst.len() as usize;
            items.push(match *inst {
                Instruction::Add { .. } => Value::String(latin1(&target[pos..pos + len])),
                Instruction::Run { byte, len } => Value::String(std::iter::repeat_n(char::from(byte), len as usize).collect()),
                Instruction::Copy { addr, len } => json!([addr, len]),
            });
            pos += len;
        }
        serde_json::to_writer(&mut *out, &Value::Array(items))
    }

    /// Close the top-level array. A delta with no windows is `[]`.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        if !self.started {
            out.push(b'[');
            self.started = true;
        }
        out.push(b']');
    }
}

fn json_err(msg: impl Into<String>) -> FormatError {
    FormatError::Json(msg.into())
}

/// Decode a complete JSON delta against `dictionary`, appending to `out`.
pub fn decode(input: &[u8], dictionary: &[u8], limits: &DecoderLimits, out: &mut Vec<u8>) -> Result<(), FormatError> {
    let windows: Vec<Vec<Value>> = serde_json::from_slice(input).map_err(|e| json_err(e.to_string()))?;
    let dict_len = dictionary.len() as u64;
    let mut decoded: u64 = 0;

    for window in windows {
        let base = out.len();
        let mut produced: u64 = 0;

        for item in window {
            match item {
                Value::String(s) => {
                    let bytes = s
                        .chars()
                        .map(|c| u8::try_from(c).map_err(|_| json_err(format!("literal char {c:?} is not a byte"))))
                        .collect::<Result<Vec<u8>, _>>()?;
                    produced += bytes.len() as u64;
                    limits.check_window(produced, decoded)?;
                    out.extend_from_slice(&bytes);
                }
                Value::Array(pair) => {
                    let [addr, len] = pair.as_slice() else {
                        return Err(json_err("COPY must be [address, length]"));
                    };
                    let (Some(addr), Some(len)) = (addr.as_u64(), len.as_u64()) else {
                        return Err(json_err("COPY address and length must be unsigned integers"));
                    };
                    let here = dict_len + produced;
                    if addr >= here {
                        return Err(FormatError::Malformed(format!("COPY address {addr} is not below here={here}")));
                    }
                    produced = produced.saturating_add(len);
                    limits.check_window(produced, decoded)?;

                    let len = len as usize;
                    if addr < dict_len {
                        let start = addr as usize;
                        let src = dictionary
                            .get(start..start + len)
                            .ok_or_else(|| FormatError::Malformed("COPY spans source and target".into()))?;
                        out.extend_from_slice(src);
                    } else {
                        let start = base + (addr - dict_len) as usize;
                        for i in 0..len {
                            let byte = out[start + i];
                            out.push(byte);
                        }
                    }
                }
                other => return Err(json_err(format!("unexpected window item {other}"))),
            }
        }
        decoded += produced;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_and_reads_back() {
        let dict = b"abcdef";
        let target = b"xyabcdzzzzxyab";
        let insts = [
            Instruction::Add { len: 2 },
            Instruction::Copy { addr: 0, len: 4 },
            Instruction::Run { byte: b'z', len: 4 },
            Instruction::Copy { addr: 6, len: 4 },
        ];
        let mut out = Vec::new();
        let mut writer = JsonWriter::new();
        writer.window(&insts, target, &mut out).unwrap();
        writer.finish(&mut out);
        assert_eq!(
            std::str::from_utf8(&out).unwrap(),
            r#"[["xy",[0,4],"zzzz",[6,4]]]"#
        );

        let mut decoded = Vec::new();
        decode(&out, dict, &DecoderLimits::default(), &mut decoded).unwrap();
        assert_eq!(decoded, target);
    }

    #[test]
    fn high_bytes_survive() {
        let target = [0u8, 0x7F, 0x80, 0xFF];
        let mut out = Vec::new();
        let mut writer = JsonWriter::new();
        writer.window(&[Instruction::Add { len: 4 }], &target, &mut out).unwrap();
        writer.window(&[Instruction::Add { len: 4 }], &target, &mut out).unwrap();
        writer.finish(&mut out);

        let mut decoded = Vec::new();
        decode(&out, b"d", &DecoderLimits::default(), &mut decoded).unwrap();
        assert_eq!(decoded, [target, target].concat());
    }

    #[test]
    fn no_windows_is_an_empty_array() {
        let mut out = Vec::new();
        JsonWriter::new().finish(&mut out);
        assert_eq!(out, b"[]");
    }

    #[test]
    fn rejects_wide_chars_and_forward_copies() {
        let limits = DecoderLimits::default();
        assert!(matches!(
            decode("[[\"\u{0100}\"]]".as_bytes(), b"d", &limits, &mut Vec::new()),
            Err(FormatError::Json(_))
        ));
        assert!(matches!(
            decode(b"[[[5,1]]]", b"abc", &limits, &mut Vec::new()),
            Err(FormatError::Malformed(_))
        ));
    }

    #[test]
    fn limits_apply() {
        let limits = DecoderLimits {
            max_target_window_size: 3,
            ..DecoderLimits::default()
        };
        assert!(matches!(
            decode(br#"[["abcd"]]"#, b"d", &limits, &mut Vec::new()),
            Err(FormatError::WindowTooLarge { size: 4, limit: 3 })
        ));
    }
}
