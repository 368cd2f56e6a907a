use crate::{Error, Result};

/// 文件名最长字节数
pub const NAME_MAX_LEN: usize = 6;

/// 目录项：2字节 inode 编号（大端）+ 6字节以 NUL 补齐的 ASCII 名字
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirEntry {
    inode_id: u16,
    name: [u8; NAME_MAX_LEN],
}

impl DirEntry {
    /// 目录项大小恒为8字节
    pub const SIZE: usize = 8;

    /// `name` 须已通过 [`validate_name`]，或是 `.` 与 `..`
    pub fn new(name: &str, inode_id: u16) -> Self {
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_MAX_LEN);
        let mut name = [0; NAME_MAX_LEN];
        name[..len].copy_from_slice(&bytes[..len]);

        Self { inode_id, name }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut name = [0; NAME_MAX_LEN];
        name.copy_from_slice(&bytes[2..Self::SIZE]);

        Self {
            inode_id: u16::from_be_bytes([bytes[0], bytes[1]]),
            name,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0; Self::SIZE];
        bytes[..2].copy_from_slice(&self.inode_id.to_be_bytes());
        bytes[2..].copy_from_slice(&self.name);
        bytes
    }

    #[inline]
    pub fn inode_id(&self) -> u16 {
        self.inode_id
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.raw_name()).into_owned()
    }

    #[inline]
    pub fn matches(&self, name: &str) -> bool {
        self.raw_name() == name.as_bytes()
    }

    fn raw_name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_MAX_LEN);
        &self.name[..len]
    }
}

/// 新建项的名字：1~6个 ASCII 字符，不含 `/`、空白与 NUL，且不能是 `.` 或 `..`
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > NAME_MAX_LEN {
        return Err(Error::InvalidArgument(format!(
            "name {name:?} must be 1 to {NAME_MAX_LEN} characters long"
        )));
    }
    if name == "." || name == ".." {
        return Err(Error::InvalidArgument(format!("name {name:?} is reserved")));
    }
    if !name
        .bytes()
        .all(|c| c.is_ascii_graphic() && c != b'/')
    {
        return Err(Error::InvalidArgument(format!("name {name:?} is invalid")));
    }

    Ok(())
}
