#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sfs::{BlockDevice, FileSystem, IoError, SECTOR_SIZE};

/// 测试用的内存盘，可以让之后的写入全部失败
pub struct MemDisk {
    sectors: Mutex<Vec<[u8; SECTOR_SIZE]>>,
    fail_writes: AtomicBool,
    /// `(扇区, 还要放过的写入次数)`，到点只失败一次
    fail_once: Mutex<Option<(usize, usize)>>,
}

impl MemDisk {
    pub fn new(num_sectors: usize) -> Arc<Self> {
        Arc::new(Self {
            sectors: Mutex::new(vec![[0; SECTOR_SIZE]; num_sectors]),
            fail_writes: AtomicBool::new(false),
            fail_once: Mutex::new(None),
        })
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 放过之后`skip`次对`sector`的写入，再让下一次失败
    pub fn fail_write_to(&self, sector: usize, skip: usize) {
        *self.fail_once.lock().unwrap() = Some((sector, skip));
    }

    /// 绕过文件系统直接读出一个扇区
    pub fn raw(&self, sector: usize) -> [u8; SECTOR_SIZE] {
        self.sectors.lock().unwrap()[sector]
    }
}

impl BlockDevice for MemDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> Result<(), IoError> {
        let sectors = self.sectors.lock().unwrap();
        let sector = sectors.get(block_id).ok_or(IoError::new(block_id))?;
        buf.copy_from_slice(sector);
        Ok(())
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> Result<(), IoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(IoError::new(block_id));
        }
        {
            let mut fail_once = self.fail_once.lock().unwrap();
            if let Some((sector, skip)) = *fail_once {
                if sector == block_id {
                    if skip == 0 {
                        *fail_once = None;
                        return Err(IoError::new(block_id));
                    }
                    *fail_once = Some((sector, skip - 1));
                }
            }
        }
        let mut sectors = self.sectors.lock().unwrap();
        let sector = sectors.get_mut(block_id).ok_or(IoError::new(block_id))?;
        sector.copy_from_slice(buf);
        Ok(())
    }

    fn num_blocks(&self) -> usize {
        self.sectors.lock().unwrap().len()
    }
}

pub const DISK_SECTORS: usize = 4096;

/// 在新的内存盘上格式化
pub fn format() -> (Arc<MemDisk>, Arc<FileSystem>) {
    let disk = MemDisk::new(DISK_SECTORS);
    let fs = FileSystem::format(disk.clone()).unwrap();
    (disk, fs)
}
