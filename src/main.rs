#[macro_use]
extern crate anyhow;

use byte_unit::Byte;
use clap::{Arg, ArgMatches, Command};
use s64ffs::{
    driver::{Driver, FileStat},
    mkfs,
    s64::{FileAttr, DATA_CAPACITY},
    FilesystemManager, FsError,
};
use std::{
    fs,
    io::{self, Write},
    path::Path,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let image_arg = || {
        Arg::new("image")
            .required(true)
            .help("Location of the file system image")
    };
    let name_arg = || Arg::new("name").required(true).help("File name on the volume");

    let matches = Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("mkfs")
                .about("Create a new filesystem")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .help("Location of the new file system image"),
                )
                .arg(
                    Arg::new("volume")
                        .short('n')
                        .long("name")
                        .takes_value(true)
                        .default_value("s64ffs")
                        .help("Volume name, at most 29 printable bytes"),
                ),
        )
        .subcommand(
            Command::new("info")
                .about("Show volume usage")
                .arg(image_arg()),
        )
        .subcommand(
            Command::new("ls")
                .about("List files in slot order")
                .arg(image_arg()),
        )
        .subcommand(
            Command::new("stat")
                .about("Show the attributes of a file")
                .arg(image_arg())
                .arg(name_arg()),
        )
        .subcommand(
            Command::new("cat")
                .about("Write a file's contents to stdout")
                .arg(image_arg())
                .arg(name_arg()),
        )
        .subcommand(
            Command::new("put")
                .about("Copy a host file into the volume, replacing any existing one")
                .arg(image_arg())
                .arg(name_arg())
                .arg(Arg::new("source").required(true).help("Host file to copy"))
                .arg(
                    Arg::new("owner")
                        .short('o')
                        .long("owner")
                        .takes_value(true)
                        .help("Owner recorded for a new file [default: $USER]"),
                ),
        )
        .subcommand(
            Command::new("rm")
                .about("Remove a file")
                .arg(image_arg())
                .arg(name_arg()),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("mkfs", m)) => mkfs::make(value(m, "file")?, value(m, "volume")?),
        Some(("info", m)) => info(value(m, "image")?),
        Some(("ls", m)) => list(value(m, "image")?),
        Some(("stat", m)) => stat(value(m, "image")?, value(m, "name")?),
        Some(("cat", m)) => cat(value(m, "image")?, value(m, "name")?),
        Some(("put", m)) => {
            let owner = match m.get_one::<String>("owner") {
                Some(owner) => owner.clone(),
                None => current_user(),
            };
            put(
                value(m, "image")?,
                value(m, "name")?,
                value(m, "source")?,
                &owner,
            )
        }
        Some(("rm", m)) => rm(value(m, "image")?, value(m, "name")?),
        _ => Err(anyhow!("unknown subcommand")),
    }
}

fn value<'a>(matches: &'a ArgMatches, id: &str) -> anyhow::Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing argument <{}>", id))
}

fn current_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "root".to_string())
}

fn info(image: &str) -> anyhow::Result<()> {
    let stats = FilesystemManager::new(image)?.statfs()?;
    let used_slots = stats.file_capacity - stats.free_count;

    println!("volume: {}", stats.volume_name);
    println!(
        "slots:  {} used, {} free, {} total",
        used_slots, stats.free_count, stats.file_capacity
    );
    println!(
        "data:   {} of {}",
        Byte::from_bytes(stats.used_bytes as _).get_appropriate_unit(true),
        Byte::from_bytes(stats.data_capacity as _).get_appropriate_unit(true)
    );
    Ok(())
}

fn list(image: &str) -> anyhow::Result<()> {
    let driver = Driver::new(FilesystemManager::new(image)?);
    let caller = current_user();

    for name in driver.manager().readdir()? {
        let path = Path::new("/").join(&name);
        let stat = driver.metadata(&path, &caller)?;
        let attr = driver.manager().getattr(&name)?;
        println!(
            "{} {:<21} {:>4} {} {}",
            mode_string(&stat),
            attr.owner,
            stat.size,
            created(&attr),
            name
        );
    }
    Ok(())
}

fn stat(image: &str, name: &str) -> anyhow::Result<()> {
    let fs = FilesystemManager::new(image)?;
    let handle = fs.open(name)?;
    let attr = fs.attr_of(handle)?;

    println!("  File: {}", name);
    println!("  Slot: {}", handle);
    println!("  Size: {}", attr.size);
    println!(" Owner: {}", attr.owner);
    println!(" Birth: {}", created(&attr));
    Ok(())
}

fn cat(image: &str, name: &str) -> anyhow::Result<()> {
    let fs = FilesystemManager::new(image)?;
    let handle = fs.open(name)?;
    let mut buf = vec![0u8; DATA_CAPACITY];
    let n = fs.read(handle, 0, &mut buf)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    out.write_all(&buf[..n])?;
    Ok(out.flush()?)
}

fn put(image: &str, name: &str, source: &str, owner: &str) -> anyhow::Result<()> {
    let data = fs::read(source)?;
    if data.len() > DATA_CAPACITY {
        return Err(anyhow!(
            "{} is {} bytes, files hold at most {}",
            source,
            data.len(),
            DATA_CAPACITY
        ));
    }

    let fs = FilesystemManager::new(image)?;
    let handle = match fs.open(name) {
        Ok(handle) => {
            fs.truncate(handle, 0)?;
            handle
        }
        Err(FsError::NotFound(_)) => fs.create(name, owner)?,
        Err(err) => return Err(err.into()),
    };
    fs.write(handle, 0, &data)?;
    Ok(())
}

fn rm(image: &str, name: &str) -> anyhow::Result<()> {
    Ok(FilesystemManager::new(image)?.unlink(name)?)
}

fn mode_string(stat: &FileStat) -> String {
    let mut s = String::with_capacity(10);
    s.push(if stat.mode & 0o040000 != 0 { 'd' } else { '-' });
    for shift in [6, 3, 0].iter() {
        let bits = (stat.mode >> shift) & 0o7;
        s.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        s.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        s.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    s
}

fn created(attr: &FileAttr) -> String {
    match attr.created_at() {
        Some(_) => {
            let date = attr.creation_date;
            let time = attr.creation_time;
            format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                date >> 16,
                (date >> 8) & 0xff,
                date & 0xff,
                time >> 24,
                (time >> 16) & 0xff,
                (time >> 8) & 0xff
            )
        }
        None => "-".to_string(),
    }
}
