//! Minimal SPIR-V scan: header validation and `OpEntryPoint` collection.

use ash::vk;

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

const HEADER_WORDS: usize = 5;
const OP_ENTRY_POINT: u32 = 15;

pub const EXECUTION_MODEL_VERTEX: u32 = 0;
pub const EXECUTION_MODEL_TESSELLATION_CONTROL: u32 = 1;
pub const EXECUTION_MODEL_TESSELLATION_EVALUATION: u32 = 2;
pub const EXECUTION_MODEL_GEOMETRY: u32 = 3;
pub const EXECUTION_MODEL_FRAGMENT: u32 = 4;
pub const EXECUTION_MODEL_GL_COMPUTE: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub execution_model: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpirvError {
    #[error("code size {0} is not a multiple of 4")]
    Misaligned(usize),

    #[error("module is {0} words, shorter than the SPIR-V header")]
    TooShort(usize),

    #[error("bad magic number 0x{0:08x}")]
    BadMagic(u32),

    #[error("instruction at word {offset} has a zero word count")]
    ZeroWordCount { offset: usize },

    #[error("instruction at word {offset} runs past the end of the module")]
    Truncated { offset: usize },
}

impl SpirvError {
    /// Whether the module is not SPIR-V at all, as opposed to malformed SPIR-V.
    pub fn is_not_spirv(&self) -> bool {
        matches!(
            self,
            SpirvError::Misaligned(_) | SpirvError::TooShort(_) | SpirvError::BadMagic(_)
        )
    }
}

/// Scan a module handed over as `code_size` bytes of `words`.
pub fn scan_module(code_size: usize, words: &[u32]) -> Result<Vec<EntryPoint>, SpirvError> {
    if code_size % 4 != 0 {
        return Err(SpirvError::Misaligned(code_size));
    }
    parse_entry_points(&words[..(code_size / 4).min(words.len())])
}

/// Validate the header and return every entry point declared in the module.
pub fn parse_entry_points(words: &[u32]) -> Result<Vec<EntryPoint>, SpirvError> {
    if words.len() < HEADER_WORDS {
        return Err(SpirvError::TooShort(words.len()));
    }
    if words[0] != SPIRV_MAGIC {
        return Err(SpirvError::BadMagic(words[0]));
    }

    let mut entry_points = Vec::new();
    let mut offset = HEADER_WORDS;
    while offset < words.len() {
        let word_count = (words[offset] >> 16) as usize;
        let opcode = words[offset] & 0xffff;
        if word_count == 0 {
            return Err(SpirvError::ZeroWordCount { offset });
        }
        if offset + word_count > words.len() {
            return Err(SpirvError::Truncated { offset });
        }

        // OpEntryPoint: model, function id, literal name, interface ids...
        if opcode == OP_ENTRY_POINT && word_count >= 4 {
            let operands = &words[offset + 1..offset + word_count];
            entry_points.push(EntryPoint {
                execution_model: operands[0],
                name: decode_literal_string(&operands[2..]),
            });
        }

        offset += word_count;
    }

    Ok(entry_points)
}

/// Execution model matching a single pipeline stage bit.
pub fn execution_model_for_stage(stage: vk::ShaderStageFlags) -> Option<u32> {
    match stage {
        vk::ShaderStageFlags::VERTEX => Some(EXECUTION_MODEL_VERTEX),
        vk::ShaderStageFlags::TESSELLATION_CONTROL => Some(EXECUTION_MODEL_TESSELLATION_CONTROL),
        vk::ShaderStageFlags::TESSELLATION_EVALUATION => {
            Some(EXECUTION_MODEL_TESSELLATION_EVALUATION)
        }
        vk::ShaderStageFlags::GEOMETRY => Some(EXECUTION_MODEL_GEOMETRY),
        vk::ShaderStageFlags::FRAGMENT => Some(EXECUTION_MODEL_FRAGMENT),
        vk::ShaderStageFlags::COMPUTE => Some(EXECUTION_MODEL_GL_COMPUTE),
        _ => None,
    }
}

fn decode_literal_string(words: &[u32]) -> String {
    let mut bytes = Vec::new();
    'outer: for word in words {
        for b in word.to_le_bytes() {
            if b == 0 {
                break 'outer;
            }
            bytes.push(b);
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Encode a string as a nul-terminated SPIR-V literal. Used to build modules
/// in tests and in the verification suite.
pub fn encode_literal_string(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Smallest module the scanner accepts: a header plus one `OpEntryPoint`.
pub fn minimal_module(execution_model: u32, name: &str) -> Vec<u32> {
    let literal = encode_literal_string(name);
    let word_count = 3 + literal.len() as u32;
    let mut words = vec![SPIRV_MAGIC, 0x0001_0000, 0, 16, 0];
    words.push((word_count << 16) | OP_ENTRY_POINT);
    words.push(execution_model);
    words.push(1);
    words.extend(literal);
    words
}
