mod common;

use std::sync::Arc;

use sfs::{
    DIRECT_COUNT, Error, FileSystem, INDIRECT_COUNT, Inode, InodeKind, MAX_FILE_SECTORS,
    ROOT_DIR_SECTOR, SECTOR_SIZE,
};

use common::{DISK_SECTORS, MemDisk};

fn new_file(fs: &Arc<FileSystem>, size: usize) -> Inode {
    let sector = fs.allocate(1).unwrap();
    Inode::create(fs, sector, size, InodeKind::File, ROOT_DIR_SECTOR).unwrap();
    Inode::open(fs, sector).unwrap()
}

#[test]
fn create_counts_index_sectors() {
    let (_, fs) = common::format();
    let free = fs.free_sectors();

    // 137个数据块，超出直接索引，需要一个一级索引块
    let inode = new_file(&fs, 70000);
    assert_eq!(inode.len(), 70000);
    assert_eq!(inode.total_sectors(), 1 + 137 + 1);
    assert_eq!(free - fs.free_sectors(), 139);

    inode.remove();
    drop(inode);
    assert_eq!(fs.free_sectors(), free);
}

#[test]
fn extension_reads_back_zeros() {
    let (_, fs) = common::format();
    let inode = new_file(&fs, 10);
    inode.write_at(0, b"0123456789").unwrap();

    // 一直扩展到二级索引的范围内
    let doubly_start = (DIRECT_COUNT + INDIRECT_COUNT) * SECTOR_SIZE;
    inode.extend(doubly_start + 3 * SECTOR_SIZE - 10).unwrap();
    assert_eq!(inode.len(), doubly_start + 3 * SECTOR_SIZE);

    let mut buf = vec![0xff; SECTOR_SIZE];
    for offset in [SECTOR_SIZE, DIRECT_COUNT * SECTOR_SIZE, doubly_start + SECTOR_SIZE] {
        assert_eq!(inode.read_at(offset, &mut buf).unwrap(), SECTOR_SIZE);
        assert!(buf.iter().all(|&b| b == 0), "offset {offset}");
    }

    let mut head = [0; 10];
    inode.read_at(0, &mut head).unwrap();
    assert_eq!(&head, b"0123456789");
}

#[test]
fn writes_past_the_end_extend() {
    let (_, fs) = common::format();
    let inode = new_file(&fs, 0);

    let offset = (DIRECT_COUNT + INDIRECT_COUNT + 1) * SECTOR_SIZE + 100;
    assert_eq!(inode.write_at(offset, b"tail").unwrap(), 4);
    assert_eq!(inode.len(), offset + 4);

    let mut buf = [0; 8];
    assert_eq!(inode.read_at(offset, &mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], b"tail");

    // 越过末尾只读到0字节
    assert_eq!(inode.read_at(offset + 4, &mut buf).unwrap(), 0);
}

#[test]
fn byte_to_sector_matches_raw_sectors() {
    let (disk, fs) = common::format();
    let len = (DIRECT_COUNT + INDIRECT_COUNT + 2) * SECTOR_SIZE;
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

    let inode = new_file(&fs, 0);
    assert_eq!(inode.write_at(0, &data).unwrap(), len);

    for offset in (0..len).step_by(997) {
        let sector = inode.byte_to_sector(offset).unwrap();
        assert_eq!(disk.raw(sector.block())[offset % SECTOR_SIZE], data[offset]);
    }
    assert_eq!(inode.byte_to_sector(len), Err(Error::OutOfRange));
}

#[test]
fn no_space_leaves_inode_unchanged() {
    let (_, fs) = common::format();
    let inode = new_file(&fs, 1000);
    let free = fs.free_sectors();

    assert_eq!(
        inode.extend((free + 1) * SECTOR_SIZE),
        Err(Error::NoSpace)
    );
    assert_eq!(
        inode.extend(MAX_FILE_SECTORS * SECTOR_SIZE),
        Err(Error::NoSpace)
    );
    assert_eq!(inode.len(), 1000);
    assert_eq!(fs.free_sectors(), free);

    // 失败的创建也不会留下任何扇区
    let sector = fs.allocate(1).unwrap();
    assert_eq!(
        Inode::create(&fs, sector, free * SECTOR_SIZE, InodeKind::File, ROOT_DIR_SECTOR),
        Err(Error::NoSpace)
    );
    assert_eq!(fs.free_sectors(), free - 1);
}

#[test]
fn device_failure_during_extend() {
    let (disk, fs) = common::format();
    let inode = new_file(&fs, 100);
    let free = fs.free_sectors();

    disk.set_fail_writes(true);
    assert!(matches!(inode.extend(4 * SECTOR_SIZE), Err(Error::Io(_))));
    disk.set_fail_writes(false);

    assert_eq!(inode.len(), 100);
    assert_eq!(fs.free_sectors(), free);
}

#[test]
fn failed_store_rolls_back_extension() {
    let (disk, fs) = common::format();
    let inode = new_file(&fs, 100);
    inode.write_at(0, b"head").unwrap();
    let sector = inode.sector().get() as usize;
    let free = fs.free_sectors();

    // 数据块都写成功，只有写回 inode 扇区失败
    disk.fail_write_to(sector, 0);
    assert!(matches!(inode.extend(4 * SECTOR_SIZE), Err(Error::Io(_))));
    assert_eq!(inode.len(), 100);
    assert_eq!(inode.total_sectors(), 2);
    assert_eq!(fs.free_sectors(), free);

    disk.fail_write_to(sector, 0);
    assert!(matches!(inode.write_at(1000, b"x"), Err(Error::Io(_))));
    assert_eq!(inode.len(), 100);
    assert_eq!(fs.free_sectors(), free);

    // 之后的扩展照常进行，原有内容不变
    inode.write_at(1000, b"x").unwrap();
    assert_eq!(inode.len(), 1001);
    let mut head = [0; 4];
    inode.read_at(0, &mut head).unwrap();
    assert_eq!(&head, b"head");

    // 磁盘上的 inode 与内存一致
    let inode_sector = inode.sector();
    drop(inode);
    let reopened = Inode::open(&fs, inode_sector).unwrap();
    assert_eq!(reopened.len(), 1001);
    assert_eq!(reopened.total_sectors(), 3);
}

#[test]
fn failed_store_keeps_free_map_on_disk() {
    let disk = MemDisk::new(DISK_SECTORS);
    let fs = FileSystem::format(disk.clone()).unwrap();
    let inode = new_file(&fs, 0);
    let free = fs.free_sectors();

    disk.fail_write_to(inode.sector().get() as usize, 0);
    assert!(matches!(
        inode.extend((DIRECT_COUNT + 2) * SECTOR_SIZE),
        Err(Error::Io(_))
    ));
    drop(inode);
    drop(fs);

    let fs = FileSystem::mount(disk).unwrap();
    assert_eq!(fs.free_sectors(), free);
}

#[test]
fn handles_share_one_inode() {
    let (_, fs) = common::format();
    let inode = new_file(&fs, 0);
    let sector = inode.sector();

    let other = Inode::open(&fs, sector).unwrap();
    assert_eq!(inode.open_count(), 2);
    other.write_at(0, b"shared").unwrap();
    assert_eq!(inode.len(), 6);

    let third = inode.clone();
    assert_eq!(other.open_count(), 3);
    drop(third);
    drop(other);
    assert_eq!(inode.open_count(), 1);
}

#[test]
fn removal_waits_for_last_handle() {
    let (_, fs) = common::format();
    let free = fs.free_sectors();
    let inode = new_file(&fs, 2000);
    let sector = inode.sector();
    let other = Inode::open(&fs, sector).unwrap();

    inode.remove();
    drop(inode);
    assert!(other.is_removed());
    assert!(fs.is_allocated(sector));

    drop(other);
    assert!(!fs.is_allocated(sector));
    assert_eq!(fs.free_sectors(), free);
}

#[test]
fn deny_write_is_counted() {
    let (_, fs) = common::format();
    let inode = new_file(&fs, 0);

    inode.deny_write();
    inode.deny_write();
    inode.allow_write();
    assert!(inode.writes_denied());
    inode.allow_write();
    assert!(!inode.writes_denied());
}
