//! # 文件系统层
//!
//! [`FileSystem`] 持有块设备、空闲扇区位图与已打开 inode 的登记表，
//! 所有操作都显式地经由它进行。
//!
//! 锁的顺序：命名空间锁 → inode 内容锁 → 位图锁。
//! 登记表锁只在打开与关闭 inode 时短暂持有，期间不获取其它锁。

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;

use block_dev::BlockDevice;
use enumflags2::BitFlags;
use spin::Mutex;

use crate::directory::{self, Directory};
use crate::free_map::FreeMap;
use crate::inode::InodeInner;
use crate::layout::DiskInode;
use crate::{
    Error, File, Inode, InodeKind, OpenFlag, ROOT_DIR_SECTOR, Result, SectorId, path,
};

pub struct FileSystem {
    pub(crate) block_device: Arc<dyn BlockDevice>,
    pub(crate) free_map: Mutex<FreeMap>,
    /// 扇区号到已打开 inode 的映射
    pub(crate) open_inodes: Mutex<BTreeMap<SectorId, Weak<InodeInner>>>,
    /// 串行化目录结构的修改与按名字的查找
    namespace: Mutex<()>,
}

impl FileSystem {
    fn new(block_device: Arc<dyn BlockDevice>, free_map: FreeMap) -> Self {
        Self {
            block_device,
            free_map: Mutex::new(free_map),
            open_inodes: Mutex::new(BTreeMap::new()),
            namespace: Mutex::new(()),
        }
    }

    /// 在块设备上建立空的文件系统：位图文件与只含自身的根目录
    pub fn format(block_device: Arc<dyn BlockDevice>) -> Result<Arc<Self>> {
        let total_sectors = block_device.num_blocks();
        let free_map = FreeMap::create(block_device.clone(), total_sectors)?;
        let fs = Arc::new(Self::new(block_device, free_map));

        Inode::create(&fs, ROOT_DIR_SECTOR, 0, InodeKind::Directory, ROOT_DIR_SECTOR)?;

        log::info!(
            "format {total_sectors} sectors, {} free",
            fs.free_sectors()
        );
        Ok(fs)
    }

    /// 挂载已格式化的块设备
    pub fn mount(block_device: Arc<dyn BlockDevice>) -> Result<Arc<Self>> {
        let total_sectors = block_device.num_blocks();
        let free_map = FreeMap::load(block_device.clone(), total_sectors)?;
        if !DiskInode::load(ROOT_DIR_SECTOR, &block_device)?.is_dir() {
            log::error!("root inode is not a directory");
            return Err(Error::StructureCorrupt(ROOT_DIR_SECTOR));
        }

        log::info!(
            "mount {total_sectors} sectors, {} free",
            free_map.free_count()
        );
        Ok(Arc::new(Self::new(block_device, free_map)))
    }

    #[inline]
    pub fn block_device(&self) -> &Arc<dyn BlockDevice> {
        &self.block_device
    }

    #[inline]
    pub fn root(self: &Arc<Self>) -> Result<Directory> {
        Directory::open_root(self)
    }

    /// 见[`path::resolve`]
    #[inline]
    pub fn resolve(self: &Arc<Self>, path: &str, cwd: SectorId) -> Result<(Directory, String)> {
        path::resolve(self, path, cwd)
    }

    /// 建立初始长度为`initial_size`字节的文件
    pub fn create(self: &Arc<Self>, path: &str, cwd: SectorId, initial_size: usize) -> Result<()> {
        let _namespace = self.namespace.lock();
        let (dir, name) = self.resolve(path, cwd)?;
        self.create_in(&dir, &name, initial_size, InodeKind::File)
    }

    pub fn mkdir(self: &Arc<Self>, path: &str, cwd: SectorId) -> Result<()> {
        let _namespace = self.namespace.lock();
        let (dir, name) = self.resolve(path, cwd)?;
        self.create_in(&dir, &name, 0, InodeKind::Directory)
    }

    /// 打开文件或目录。
    ///
    /// 带有[`OpenFlag::CREATE`]时，不存在的文件会被建立；已存在则原样打开。
    /// 目录只能以只读方式打开。
    pub fn open(
        self: &Arc<Self>,
        path: &str,
        cwd: SectorId,
        flags: BitFlags<OpenFlag>,
    ) -> Result<File> {
        let [readable, writable] = if flags.contains(OpenFlag::WRONLY) {
            [false, true]
        } else if flags.contains(OpenFlag::RDWR) {
            [true, true]
        } else {
            [true, false]
        };

        let _namespace = self.namespace.lock();
        let (dir, name) = self.resolve(path, cwd)?;
        let inode = match dir.lookup(&name) {
            Err(Error::NotFound) if flags.contains(OpenFlag::CREATE) => {
                self.create_in(&dir, &name, 0, InodeKind::File)?;
                dir.lookup(&name)?
            }
            inode => inode?,
        };

        if inode.is_dir() && writable {
            return Err(Error::IsADirectory);
        }
        Ok(File::new(inode, readable, writable))
    }

    /// 删除文件或空目录；仍打开着的会在最后一个句柄关闭时才归还扇区
    pub fn remove(self: &Arc<Self>, path: &str, cwd: SectorId) -> Result<()> {
        let _namespace = self.namespace.lock();
        let (dir, name) = self.resolve(path, cwd)?;
        dir.remove(&name, cwd)
    }

    /// 返回新的当前目录
    pub fn chdir(self: &Arc<Self>, path: &str, cwd: SectorId) -> Result<SectorId> {
        let _namespace = self.namespace.lock();
        let (dir, name) = self.resolve(path, cwd)?;
        let inode = dir.lookup(&name)?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok(inode.sector())
    }

    /// 列出目录下的全部名字，按目录项的顺序
    pub fn read_dir(self: &Arc<Self>, path: &str, cwd: SectorId) -> Result<Vec<String>> {
        let _namespace = self.namespace.lock();
        let (dir, name) = self.resolve(path, cwd)?;
        let mut dir = Directory::open(dir.lookup(&name)?)?;

        let mut names = Vec::new();
        while let Some(name) = dir.readdir()? {
            names.push(name);
        }
        Ok(names)
    }

    #[inline]
    pub fn allocate(&self, count: usize) -> Result<SectorId> {
        self.free_map.lock().allocate(count)
    }

    #[inline]
    pub fn release(&self, sector: SectorId, count: usize) -> Result<()> {
        self.free_map.lock().release(sector, count)
    }

    #[inline]
    pub fn available(&self, count: usize) -> bool {
        self.free_map.lock().available(count)
    }

    #[inline]
    pub fn free_sectors(&self) -> usize {
        self.free_map.lock().free_count()
    }

    #[inline]
    pub fn total_sectors(&self) -> usize {
        self.free_map.lock().total()
    }

    #[inline]
    pub fn is_allocated(&self, sector: SectorId) -> bool {
        self.free_map.lock().is_allocated(sector)
    }

    /// 在`dir`下建立名为`name`的 inode，须持有命名空间锁
    fn create_in(
        self: &Arc<Self>,
        dir: &Directory,
        name: &str,
        initial_size: usize,
        kind: InodeKind,
    ) -> Result<()> {
        directory::check_name(name)?;
        if dir.contains(name)? {
            return Err(Error::Duplicate);
        }

        let sector = self.allocate(1)?;
        if let Err(err) = Inode::create(self, sector, initial_size, kind, dir.sector()) {
            self.release(sector, 1)?;
            return Err(err);
        }

        if let Err(err) = dir.add(name, sector) {
            // 没有目录项指向它，关闭时整体归还
            Inode::open(self, sector)?.remove();
            return Err(err);
        }

        Ok(())
    }
}
