// Shader module loading
//
// Vulkan consumes SPIR-V as 32-bit words. Binaries are read from disk as
// plain bytes; their structure is left to the driver to judge.

use ash::vk;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use super::error::{BootstrapError, Result, Stage};

/// Raw bytes of a compiled shader.
#[derive(Debug, Clone)]
pub struct ShaderBinary {
    pub path: PathBuf,
    bytes: Vec<u8>,
}

impl ShaderBinary {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = std::fs::read(&path).map_err(|source| BootstrapError::ResourceIo {
            path: path.clone(),
            source,
        })?;

        log::debug!("Loaded shader {} ({} bytes)", path.display(), bytes.len());

        Ok(Self { path, bytes })
    }

    #[cfg(test)]
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reinterpret the bytes as SPIR-V words.
    pub fn words(&self) -> Result<Vec<u32>> {
        let invalid = || BootstrapError::InvalidShaderBinary { len: self.len() };
        if self.is_empty() || self.len() % 4 != 0 {
            return Err(invalid());
        }
        // read_spv copies into an aligned buffer and fixes byte order
        ash::util::read_spv(&mut Cursor::new(&self.bytes)).map_err(|_| invalid())
    }
}

/// Shader module destroyed when it goes out of scope.
pub struct ShaderModule<'a> {
    pub handle: vk::ShaderModule,
    device: &'a ash::Device,
}

impl<'a> ShaderModule<'a> {
    pub fn new(device: &'a ash::Device, binary: &ShaderBinary) -> Result<Self> {
        let code = binary.words()?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        let handle = unsafe { device.create_shader_module(&create_info, None) }
            .map_err(BootstrapError::driver(Stage::ShaderModule))?;

        Ok(Self { handle, device })
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.handle, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    fn spirv_stub() -> Vec<u8> {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        bytes
    }

    #[test]
    fn word_aligned_bytes_become_words() {
        let binary = ShaderBinary::from_bytes("stub.spv", spirv_stub());
        assert_eq!(binary.words().unwrap(), vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn misaligned_length_is_rejected() {
        let mut bytes = spirv_stub();
        bytes.push(0);
        let binary = ShaderBinary::from_bytes("odd.spv", bytes);
        assert!(matches!(
            binary.words(),
            Err(BootstrapError::InvalidShaderBinary { len: 9 })
        ));
    }

    #[test]
    fn empty_binary_is_rejected() {
        let binary = ShaderBinary::from_bytes("empty.spv", Vec::new());
        assert!(matches!(
            binary.words(),
            Err(BootstrapError::InvalidShaderBinary { len: 0 })
        ));
    }

    #[test]
    fn missing_file_is_a_resource_failure() {
        let err = ShaderBinary::load("does/not/exist.spv").unwrap_err();
        assert!(matches!(err, BootstrapError::ResourceIo { .. }));
        assert_eq!(err.stage(), Stage::ShaderBinary);
    }

    #[test]
    fn load_reads_whole_file() {
        let path = std::env::temp_dir().join(format!("vk-bootstrap-{}.spv", std::process::id()));
        std::fs::write(&path, spirv_stub()).unwrap();

        let binary = ShaderBinary::load(&path).unwrap();
        assert_eq!(binary.len(), 8);
        assert_eq!(binary.path, path);

        std::fs::remove_file(&path).unwrap();
    }
}
