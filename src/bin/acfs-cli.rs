//! Example CLI driving an in-memory ACFS instance end to end: format,
//! write, read, stat, delete, check integrity. Not part of the core
//! crate's contract surface — a port (in spirit, not line-by-line) of
//! `original_source/examples/basic_usage.c`.

use clap::{Parser, Subcommand};
use log::info;

use acfs::{Acfs, Config, MemoryDevice};

#[derive(Parser)]
#[command(name = "acfs-cli", about = "Drive an in-memory ACFS filesystem")]
struct Cli {
    /// Size of the simulated EEPROM device, in bytes.
    #[arg(long, default_value_t = 64 * 1024)]
    device_size: u32,

    /// Bytes per cluster.
    #[arg(long, default_value_t = 256)]
    cluster_size: u16,

    /// Clusters reserved for the superblock and directory.
    #[arg(long, default_value_t = 4)]
    reserved_clusters: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the built-in demo sequence against a fresh device.
    Demo,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = Config {
        cluster_size: cli.cluster_size,
        reserved_clusters: cli.reserved_clusters,
        format_if_invalid: true,
        enable_crc_check: true,
    };

    let fs = Acfs::new(MemoryDevice::eeprom(cli.device_size));
    match cli.command {
        Command::Demo => run_demo(fs, config),
    }
}

fn run_demo(mut fs: Acfs<MemoryDevice>, config: Config) {
    fs.mount(config).expect("mount failed");
    info!("ACFS mounted");

    let stats = fs.get_stats().expect("get_stats failed");
    println!(
        "filesystem stats: total={} used={} free={} entries={}",
        stats.total, stats.used, stats.free, stats.data_count
    );

    let test1 = b"Hello, ACFS! This is test data 1.";
    let test2 = b"ACFS is a lightweight filesystem for embedded systems.";

    println!("\n=== writing test data ===");
    match fs.write(b"test1", test1) {
        Ok(()) => println!("wrote 'test1'"),
        Err(e) => println!("failed to write 'test1': {e}"),
    }
    match fs.write(b"test2", test2) {
        Ok(()) => println!("wrote 'test2'"),
        Err(e) => println!("failed to write 'test2': {e}"),
    }

    println!("\n=== checking existence ===");
    for id in [&b"test1"[..], &b"test2"[..], &b"test3"[..]] {
        let present = fs.exists(id).unwrap_or(false);
        println!("'{}' exists: {present}", String::from_utf8_lossy(id));
    }

    println!("\n=== reading test data ===");
    let mut buf = [0u8; 256];
    for id in [&b"test1"[..], &b"test2"[..]] {
        match fs.read(id, &mut buf) {
            Ok(actual) => println!(
                "read '{}': {:?} ({actual} bytes)",
                String::from_utf8_lossy(id),
                String::from_utf8_lossy(&buf[..actual as usize])
            ),
            Err(e) => println!("failed to read '{}': {e}", String::from_utf8_lossy(id)),
        }
    }

    println!("\n=== updating test1 ===");
    let updated = b"Updated test data for test1.";
    fs.write(b"test1", updated).expect("rewrite failed");
    let actual = fs.read(b"test1", &mut buf).expect("read after rewrite failed");
    println!(
        "read updated 'test1': {:?}",
        String::from_utf8_lossy(&buf[..actual as usize])
    );

    println!("\n=== deleting test2 ===");
    fs.delete(b"test2").expect("delete failed");
    println!("'test2' exists: {}", fs.exists(b"test2").unwrap_or(true));

    println!("\n=== final stats ===");
    let stats = fs.get_stats().expect("get_stats failed");
    println!(
        "filesystem stats: total={} used={} free={} entries={}",
        stats.total, stats.used, stats.free, stats.data_count
    );

    println!("\n=== integrity check ===");
    match fs.check_integrity() {
        Ok(()) => println!("integrity check passed"),
        Err(e) => println!("integrity check failed: {e}"),
    }

    let _device = fs.unmount();
    info!("ACFS unmounted");
}
