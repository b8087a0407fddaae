// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Blobs are compiled ahead of time (see
// build.rs) and read from disk at startup.

use ash::vk;
use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;

use super::Backend;
use crate::error::{InitError, InitResult, ShaderError};

/// Both stages are bound at this entry point.
pub const ENTRY_POINT: &CStr = c"main";

/// A named SPIR-V blob, not yet validated.
#[derive(Debug, Clone)]
pub struct ShaderBinary {
    name: String,
    bytes: Vec<u8>,
}

impl ShaderBinary {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> InitResult<Self> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|e| InitError::ShaderModule {
            name: name.clone(),
            source: ShaderError::Io(e),
        })?;

        log::debug!("Loaded shader {} ({} bytes)", name, bytes.len());
        Ok(Self { name, bytes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decodes the blob into 32-bit words.
    ///
    /// Rejects blobs whose length is not a whole number of words and blobs
    /// that do not start with the SPIR-V magic number. Byte order is taken
    /// from the magic, and the result is always correctly aligned.
    pub fn words(&self) -> Result<Vec<u32>, ShaderError> {
        Ok(ash::util::read_spv(&mut Cursor::new(self.bytes.as_slice()))?)
    }
}

/// The vertex and fragment blobs a pipeline is built from.
#[derive(Debug, Clone)]
pub struct ShaderBinaries {
    pub vertex: ShaderBinary,
    pub fragment: ShaderBinary,
}

impl ShaderBinaries {
    pub fn load(vertex: impl AsRef<Path>, fragment: impl AsRef<Path>) -> InitResult<Self> {
        Ok(Self {
            vertex: ShaderBinary::from_file(vertex)?,
            fragment: ShaderBinary::from_file(fragment)?,
        })
    }
}

/// The caller owns the returned module and must destroy it.
pub fn create_shader_module<B: Backend + ?Sized>(
    backend: &mut B,
    binary: &ShaderBinary,
) -> InitResult<vk::ShaderModule> {
    let shader_error = |source: ShaderError| InitError::ShaderModule {
        name: binary.name().to_string(),
        source,
    };

    let code = binary.words().map_err(shader_error)?;
    backend
        .create_shader_module(&code)
        .map_err(|e| shader_error(ShaderError::Rejected(e)))
}
