//! # 目录层
//!
//! 目录是一个 inode，其内容为紧密排列的[`DirEntry`]。
//! 删除目录项只清除占用标记，槽位留给之后的添加复用。
//! `.`与`..`不占用目录项：前者即目录自身，后者记录在 inode 的`parent`中。

use alloc::borrow::ToOwned;
use alloc::string::String;
use alloc::sync::Arc;

use crate::layout::DirEntry;
use crate::{Error, FileSystem, Inode, NAME_MAX, ROOT_DIR_SECTOR, Result, SectorId};

/// 打开的目录，带有`readdir`的读取位置
pub struct Directory {
    inode: Inode,
    pos: usize,
}

impl Directory {
    /// 以目录的方式打开`inode`
    pub fn open(inode: Inode) -> Result<Self> {
        if !inode.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok(Self { inode, pos: 0 })
    }

    #[inline]
    pub fn open_root(fs: &Arc<FileSystem>) -> Result<Self> {
        Self::open(Inode::open(fs, ROOT_DIR_SECTOR)?)
    }

    /// 另开一个共享同一 inode 的目录，读取位置从头开始
    #[inline]
    pub fn reopen(&self) -> Self {
        Self {
            inode: self.inode.clone(),
            pos: 0,
        }
    }

    #[inline]
    pub fn inode(&self) -> &Inode {
        &self.inode
    }

    #[inline]
    pub fn into_inode(self) -> Inode {
        self.inode
    }

    #[inline]
    pub fn sector(&self) -> SectorId {
        self.inode.sector()
    }

    /// 按名字查找，找到时打开对应的 inode
    pub fn lookup(&self, name: &str) -> Result<Inode> {
        match name {
            "." => Ok(self.inode.clone()),
            ".." => Inode::open(self.inode.fs(), self.inode.parent()),
            _ => {
                let (_, entry) = self.find(name)?.ok_or(Error::NotFound)?;
                Inode::open(self.inode.fs(), entry.inode_sector().into())
            }
        }
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(matches!(name, "." | "..") || self.find(name)?.is_some())
    }

    /// 添加名为`name`、指向`inode_sector`的目录项，并把该 inode 的父目录设为本目录
    pub fn add(&self, name: &str, inode_sector: SectorId) -> Result<()> {
        check_name(name)?;
        if self.inode.is_removed() {
            log::warn!("add {name:?} to removed directory {}", self.sector());
            return Err(Error::NotFound);
        }
        if self.find(name)?.is_some() {
            return Err(Error::Duplicate);
        }

        // 第一个空闲槽位，没有就追加在末尾
        let mut entry = DirEntry::default();
        let mut offset = 0;
        while self.inode.read_at(offset, entry.as_bytes_mut())? == DirEntry::SIZE {
            if !entry.in_use() {
                break;
            }
            offset += DirEntry::SIZE;
        }

        // 目录项是最后一步，此前失败时目录保持原样
        let parent: u32 = self.sector().into();
        Inode::open(self.inode.fs(), inode_sector)?.update(|child| child.parent = parent)?;

        let mut entry = DirEntry::new(name, inode_sector.into());
        self.inode.write_at(offset, entry.as_bytes())?;
        if let Err(err) = self.inode.update(|dir| dir.entry_count += 1) {
            entry.release();
            if let Err(err) = self.inode.write_at(offset, entry.as_bytes()) {
                log::error!("failed to drop entry {name:?} of directory {}: {err}", self.sector());
            }
            return Err(err);
        }

        log::debug!("add {name:?} -> {inode_sector} to directory {}", self.sector());
        Ok(())
    }

    /// 删除名为`name`的目录项。
    ///
    /// 目标为目录时，不能是`cwd`，也必须为空。
    /// 目标 inode 被标记删除，最后一个句柄关闭时归还其扇区。
    pub fn remove(&self, name: &str, cwd: SectorId) -> Result<()> {
        let (offset, mut entry) = self.find(name)?.ok_or(Error::NotFound)?;
        let inode = Inode::open(self.inode.fs(), entry.inode_sector().into())?;

        if inode.is_dir() {
            if inode.sector() == cwd {
                log::warn!("refuse to remove current directory {name:?}");
                return Err(Error::IsCurrentDirectory);
            }
            if inode.entry_count() > 0 {
                log::warn!("refuse to remove non-empty directory {name:?}");
                return Err(Error::DirectoryNotEmpty);
            }
        }

        entry.release();
        self.inode.write_at(offset, entry.as_bytes())?;
        self.inode
            .update(|dir| dir.entry_count = dir.entry_count.saturating_sub(1))?;
        inode.remove();

        log::debug!("remove {name:?} from directory {}", self.sector());
        Ok(())
    }

    /// 依次返回正在使用的目录项的名字，读完时返回`None`
    #[inline]
    pub fn readdir(&mut self) -> Result<Option<String>> {
        next_entry(&self.inode, &mut self.pos)
    }

    /// 找到正在使用的同名目录项及其偏移
    fn find(&self, name: &str) -> Result<Option<(usize, DirEntry)>> {
        let mut entry = DirEntry::default();
        let mut offset = 0;
        while self.inode.read_at(offset, entry.as_bytes_mut())? == DirEntry::SIZE {
            if entry.in_use() && entry.name() == name {
                return Ok(Some((offset, entry)));
            }
            offset += DirEntry::SIZE;
        }
        Ok(None)
    }
}

/// 从`pos`起读出下一个正在使用的目录项，并推进`pos`
pub(crate) fn next_entry(inode: &Inode, pos: &mut usize) -> Result<Option<String>> {
    let mut entry = DirEntry::default();
    while inode.read_at(*pos, entry.as_bytes_mut())? == DirEntry::SIZE {
        *pos += DirEntry::SIZE;
        if entry.in_use() {
            return Ok(Some(entry.name().to_owned()));
        }
    }
    Ok(None)
}

/// 可以作为目录项的名字
pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(Error::InvalidName);
    }
    if name.len() > NAME_MAX {
        return Err(Error::NameTooLong);
    }
    Ok(())
}
