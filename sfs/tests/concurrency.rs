mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use sfs::{Error, OpenFlag, ROOT_DIR_SECTOR};

const ROOT: sfs::SectorId = ROOT_DIR_SECTOR;
const THREADS: usize = 8;
/// 每个写者负责的区域，刻意不与扇区对齐
const REGION: usize = 3000;

fn tag(region: usize) -> u8 {
    region as u8 + 1
}

#[test]
fn writers_and_readers_share_one_file() {
    let (_, fs) = common::format();
    let free = fs.free_sectors();
    fs.create("/shared", ROOT, 0).unwrap();

    let barrier = Arc::new(Barrier::new(2 * THREADS));
    let writers = (0..THREADS).map(|i| {
        let fs = fs.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            let file = fs.open("/shared", ROOT, OpenFlag::RDWR.into()).unwrap();
            let data = vec![tag(i); REGION];
            barrier.wait();

            // 倒序写入，让每个写者都可能越过末尾
            let offset = (THREADS - 1 - i) * REGION;
            for chunk in (0..REGION).step_by(500) {
                let end = (chunk + 500).min(REGION);
                assert_eq!(
                    file.write_at(offset + chunk, &data[chunk..end]).unwrap(),
                    end - chunk
                );
            }

            let mut buf = vec![0; REGION];
            assert_eq!(file.read_at(offset, &mut buf).unwrap(), REGION);
            assert_eq!(buf, data);
        })
    });
    let writers: Vec<_> = writers.collect();

    let readers = (0..THREADS).map(|_| {
        let fs = fs.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            let file = fs.open("/shared", ROOT, OpenFlag::read_only()).unwrap();
            let mut buf = vec![0; THREADS * REGION];
            barrier.wait();

            for _ in 0..50 {
                let len = file.read_at(0, &mut buf).unwrap();
                assert!(len <= THREADS * REGION);
                // 尚未写到的字节读出为0，写过的属于对应区域的写者
                for (offset, &byte) in buf[..len].iter().enumerate() {
                    let owner = THREADS - 1 - offset / REGION;
                    assert!(byte == 0 || byte == tag(owner), "offset {offset}");
                }
            }
        })
    });
    let readers: Vec<_> = readers.collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().expect("no panic");
    }

    let mut file = fs.open("/shared", ROOT, OpenFlag::read_only()).unwrap();
    assert_eq!(file.len(), THREADS * REGION);
    let mut buf = vec![0; THREADS * REGION];
    assert_eq!(file.read(&mut buf).unwrap(), THREADS * REGION);
    for (region, chunk) in buf.chunks(REGION).enumerate() {
        assert!(chunk.iter().all(|&b| b == tag(THREADS - 1 - region)));
    }

    fs.remove("/shared", ROOT).unwrap();
    drop(file);
    let root = fs.root().unwrap();
    assert_eq!(fs.free_sectors() + root.inode().total_sectors() - 1, free);
}

#[test]
fn create_open_remove_in_one_directory() {
    let (_, fs) = common::format();
    let free = fs.free_sectors();
    fs.mkdir("/d", ROOT).unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles = (0..THREADS).map(|i| {
        let fs = fs.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            let path = format!("/d/t{i}");
            let data = vec![tag(i); REGION];
            let mut won = 0;
            barrier.wait();

            for round in 0..20 {
                fs.create(&path, ROOT, 0).unwrap();
                let mut file = fs.open(&path, ROOT, OpenFlag::RDWR.into()).unwrap();
                assert_eq!(file.write(&data).unwrap(), REGION);

                // 删除后仍可通过已打开的句柄读写
                fs.remove(&path, ROOT).unwrap();
                assert!(matches!(
                    fs.open(&path, ROOT, OpenFlag::read_only()),
                    Err(Error::NotFound)
                ));
                let mut buf = vec![0; REGION];
                file.seek(0);
                assert_eq!(file.read(&mut buf).unwrap(), REGION);
                assert_eq!(buf, data);
                drop(file);

                // 所有线程争抢同一个名字，每轮至多一个成功
                match fs.create(&format!("/d/race{round}"), ROOT, 100) {
                    Ok(()) => won += 1,
                    Err(Error::Duplicate) => (),
                    Err(err) => panic!("unexpected {err}"),
                }
            }
            won
        })
    });
    let handles: Vec<_> = handles.collect();
    let won: usize = handles.into_iter().map(|h| h.join().expect("no panic")).sum();

    // 每轮的名字恰好被建立了一次
    assert_eq!(won, 20);
    let mut names = fs.read_dir("/d", ROOT).unwrap();
    names.sort();
    let mut expected: Vec<_> = (0..20).map(|round| format!("race{round}")).collect();
    expected.sort();
    assert_eq!(names, expected);

    for round in 0..20 {
        fs.remove(&format!("/d/race{round}"), ROOT).unwrap();
    }
    assert!(fs.read_dir("/d", ROOT).unwrap().is_empty());
    fs.remove("/d", ROOT).unwrap();

    // 归还的扇区与分配的一致，只差根目录扩展出的数据块
    let root = fs.root().unwrap();
    assert_eq!(fs.free_sectors() + root.inode().total_sectors() - 1, free);
}
