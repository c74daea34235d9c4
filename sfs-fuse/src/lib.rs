
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use block_dev::{BlockDevice, IoError};
use sfs::{FileSystem, OpenFlag, ROOT_DIR_SECTOR, SECTOR_SIZE};

/// 以宿主文件模拟的块设备
pub struct BlockFile {
    file: Mutex<File>,
    num_blocks: usize,
}

impl BlockFile {
    /// 块数由文件长度决定，不足一块的尾部被忽略
    pub fn new(file: File) -> io::Result<Self> {
        let num_blocks = file.metadata()?.len() as usize / SECTOR_SIZE;
        Ok(Self {
            file: Mutex::new(file),
            num_blocks,
        })
    }

    fn access(&self, block_id: usize, op: impl FnOnce(&mut File) -> io::Result<()>) -> Result<(), IoError> {
        let mut file = self.file.lock().map_err(|_| IoError::new(block_id))?;
        file.seek(SeekFrom::Start((block_id * SECTOR_SIZE) as u64))
            .and_then(|_| op(&mut file))
            .map_err(|err| {
                log::error!("block {block_id}: {err}");
                IoError::new(block_id)
            })
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), IoError> {
        self.access(block_id, |file| file.read_exact(buf))
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), IoError> {
        self.access(block_id, |file| file.write_all(buf))
    }

    fn num_blocks(&self) -> usize {
        self.num_blocks
    }
}

#[inline]
pub fn to_io(err: sfs::Error) -> io::Error {
    io::Error::other(err)
}

/// 建立`size`字节的镜像文件并格式化
pub fn create_image(path: &Path, size: u64) -> io::Result<Arc<FileSystem>> {
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    fd.set_len(size)?;

    FileSystem::format(Arc::new(BlockFile::new(fd)?)).map_err(to_io)
}

pub fn open_image(path: &Path) -> io::Result<Arc<FileSystem>> {
    let fd = OpenOptions::new().read(true).write(true).open(path)?;
    FileSystem::mount(Arc::new(BlockFile::new(fd)?)).map_err(to_io)
}

/// 把宿主目录`source`下的内容递归复制到镜像的`target`目录中，返回复制的文件数
pub fn pack(fs: &Arc<FileSystem>, source: &Path, target: &str) -> io::Result<usize> {
    let mut entries = fs::read_dir(source)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut count = 0;
    for entry in entries {
        let name = entry.file_name().into_string().map_err(|name| {
            io::Error::new(io::ErrorKind::InvalidData, format!("non-UTF-8 name {name:?}"))
        })?;
        let path = if target.ends_with('/') {
            format!("{target}{name}")
        } else {
            format!("{target}/{name}")
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            fs.mkdir(&path, ROOT_DIR_SECTOR).map_err(to_io)?;
            count += pack(fs, &entry.path(), &path)?;
        } else if file_type.is_file() {
            let data = fs::read(entry.path())?;
            let mut file = fs
                .open(&path, ROOT_DIR_SECTOR, OpenFlag::WRONLY | OpenFlag::CREATE)
                .map_err(to_io)?;
            file.write(&data).map_err(to_io)?;
            log::info!("pack {path:?} ({} bytes)", data.len());
            count += 1;
        } else {
            log::warn!("skip {:?}", entry.path());
        }
    }

    Ok(count)
}

/// 读出镜像中文件的全部内容
pub fn read_file(fs: &Arc<FileSystem>, path: &str) -> io::Result<Vec<u8>> {
    let mut file = fs
        .open(path, ROOT_DIR_SECTOR, OpenFlag::read_only())
        .map_err(to_io)?;
    let mut data = vec![0; file.len()];
    let len = file.read(&mut data).map_err(to_io)?;
    data.truncate(len);
    Ok(data)
}
