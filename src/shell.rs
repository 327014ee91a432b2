//! The interactive command interpreter driving the filesystem core.

use ext2fs::dir::DirListEntry;
use ext2fs::dirent::DIRENT_TYPE_DIRECTORY;
use ext2fs::error::{Error, Result};
use ext2fs::open_file::OpenFlags;
use ext2fs::prompt::prompt;
use ext2fs::users::UserStore;
use ext2fs::volume::Volume;
use std::path::{Path, PathBuf};

/// The interpreter prompt.
const PROMPT: &str = "ext2fs> ";

/// Prints help for the shell's internal commands.
fn print_cmd_help() {
    println!();
    println!("Help:");
    println!();
    println!("  Volume");
    println!("   format <image>\t\tcreate a fresh filesystem on the image file");
    println!("   mount <image>\t\tmount the image file");
    println!("   umount\t\t\tunmount the current volume");
    println!("   status\t\t\tdump the volume counters");
    println!();
    println!("  Session");
    println!("   login <user> [password]\tauthenticate against the user store");
    println!("   logout\t\t\tclear the current identity");
    println!("   users\t\t\tlist the known users");
    println!();
    println!("  Tree");
    println!("   mkdir <path>\t\t\tcreate a directory");
    println!("   rmdir <path>\t\t\tremove an empty directory");
    println!("   dir [path]\t\t\tlist a directory (default /)");
    println!("   cd <path>\t\t\tchange the working directory");
    println!("   create <path>\t\tcreate an empty regular file");
    println!("   delete <path>\t\tremove a regular file");
    println!("   chmod <path> <octal>\t\tchange the permission bits");
    println!("   chown <path> <uid> <gid>\tchange the owner");
    println!();
    println!("  Files");
    println!("   open <path> <flag>\t\topen a file (0 read, 1 write, 2 both)");
    println!("   close <fd>\t\t\tclose a descriptor");
    println!("   read <fd> <size>\t\tread bytes at the current offset");
    println!("   write <fd> <data...>\t\twrite bytes at the current offset");
    println!();
    println!("  Misc");
    println!("   help\t\t\t\tprint this menu");
    println!("   quit\t\t\t\texit");
    println!();
}

/// Renders a mode the way `ls -l` does.
fn mode_string(file_type: u8, mode: u16) -> String {
    let mut out = String::with_capacity(10);
    out.push(if file_type == DIRENT_TYPE_DIRECTORY {
        'd'
    } else {
        '-'
    });
    for shift in [6, 3, 0] {
        let triplet = mode >> shift;
        out.push(if triplet & 0o4 != 0 { 'r' } else { '-' });
        out.push(if triplet & 0o2 != 0 { 'w' } else { '-' });
        out.push(if triplet & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}

/// Prints one listing row.
fn print_dir_entry(entry: &DirListEntry) {
    println!(
        "{} {:>5} {:>5} {:>8} {:>10} {}",
        mode_string(entry.file_type, entry.mode),
        entry.uid,
        entry.gid,
        entry.size,
        entry.mtime,
        String::from_utf8_lossy(&entry.name)
    );
}

/// State carried across commands.
pub struct Shell {
    volume: Option<Volume>,
    users_path: PathBuf,
}

impl Shell {
    pub fn new(users_path: PathBuf) -> Self {
        Self {
            volume: None,
            users_path,
        }
    }

    fn volume(&mut self) -> Result<&mut Volume> {
        self.volume.as_mut().ok_or(Error::NotMounted)
    }

    /// Executes one command, returning 0 on success and a negative value on
    /// error.
    fn handle_cmd(&mut self, cmd: &str, args: &[&str]) -> i32 {
        match self.dispatch(cmd, args) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{cmd}: {e}");
                -1
            }
        }
    }

    fn dispatch(&mut self, cmd: &str, args: &[&str]) -> Result<()> {
        match cmd {
            "format" => {
                let [path] = *args else {
                    return Err(Error::InvalidArgument);
                };
                Volume::format(Path::new(path), None)
            }

            "mount" => {
                let [path] = *args else {
                    return Err(Error::InvalidArgument);
                };
                if self.volume.is_some() {
                    return Err(Error::AlreadyMounted);
                }
                self.volume = Some(Volume::mount(Path::new(path))?);
                Ok(())
            }

            "umount" => {
                let vol = self.volume.take().ok_or(Error::NotMounted)?;
                vol.unmount()
            }

            "status" => {
                let status = self.volume()?.status();
                println!("volume name:      {}", status.volume_name);
                println!("filesystem id:    {}", status.filesystem_id);
                println!("total blocks:     {}", status.total_blocks);
                println!("free blocks:      {}", status.free_blocks);
                println!("total inodes:     {}", status.total_inodes);
                println!("free inodes:      {}", status.free_inodes);
                println!("first data block: {}", status.first_data_block);
                println!("last mount:       {}", status.last_mount_timestamp);
                println!("last write:       {}", status.last_write_timestamp);
                Ok(())
            }

            "login" => {
                let (user, pass) = match *args {
                    [user] => {
                        let pass = prompt("Password: ", true).ok_or(Error::InvalidArgument)?;
                        (user, pass)
                    }
                    [user, pass] => (user, pass.to_owned()),
                    _ => return Err(Error::InvalidArgument),
                };
                let store = UserStore::load(&self.users_path)?;
                self.volume()?.login(&store, user, &pass)
            }

            "logout" => {
                self.volume()?.logout();
                Ok(())
            }

            "users" => {
                let store = UserStore::load(&self.users_path)?;
                for ent in store.iter() {
                    println!("{}:{}:{}", ent.name, ent.uid, ent.gid);
                }
                Ok(())
            }

            "mkdir" => self.volume()?.mkdir(single_path(args)?),
            "rmdir" => self.volume()?.rmdir(single_path(args)?),

            "dir" => {
                let path = match *args {
                    [] => "/",
                    [path] => path,
                    _ => return Err(Error::InvalidArgument),
                };
                let entries = self.volume()?.list(path)?;
                for entry in &entries {
                    print_dir_entry(entry);
                }
                Ok(())
            }

            "cd" => self.volume()?.cd(single_path(args)?),
            "create" => self.volume()?.create(single_path(args)?),
            "delete" => self.volume()?.unlink(single_path(args)?),

            "open" => {
                let [path, flags] = *args else {
                    return Err(Error::InvalidArgument);
                };
                let flags = OpenFlags::from_raw(parse_number(flags)?)?;
                let fd = self.volume()?.open(path, flags)?;
                println!("fd = {fd}");
                Ok(())
            }

            "close" => {
                let [fd] = *args else {
                    return Err(Error::InvalidArgument);
                };
                self.volume()?.close(parse_number(fd)?)
            }

            "read" => {
                let [fd, size] = *args else {
                    return Err(Error::InvalidArgument);
                };
                let fd = parse_number(fd)?;
                let size = parse_number(size)? as usize;
                let data = self.volume()?.read_fd(fd, size)?;
                println!("{}", String::from_utf8_lossy(&data));
                println!("{} bytes read", data.len());
                Ok(())
            }

            "write" => {
                let Some((fd, data)) = args.split_first() else {
                    return Err(Error::InvalidArgument);
                };
                let fd = parse_number(fd)?;
                let data = data.join(" ");
                let n = self.volume()?.write_fd(fd, data.as_bytes())?;
                println!("{n} bytes written");
                Ok(())
            }

            "chmod" => {
                let [path, mode] = *args else {
                    return Err(Error::InvalidArgument);
                };
                let mode =
                    u16::from_str_radix(mode, 8).map_err(|_| Error::InvalidArgument)?;
                self.volume()?.chmod(path, mode)
            }

            "chown" => {
                let [path, uid, gid] = *args else {
                    return Err(Error::InvalidArgument);
                };
                let uid = uid.parse().map_err(|_| Error::InvalidArgument)?;
                let gid = gid.parse().map_err(|_| Error::InvalidArgument)?;
                self.volume()?.chown(path, uid, gid)
            }

            "help" => {
                print_cmd_help();
                Ok(())
            }

            _ => {
                eprintln!("{cmd}: unknown command");
                Ok(())
            }
        }
    }
}

/// Extracts the single path argument of a command.
fn single_path<'a>(args: &[&'a str]) -> Result<&'a str> {
    match *args {
        [path] => Ok(path),
        _ => Err(Error::InvalidArgument),
    }
}

/// Parses a decimal numeric argument.
fn parse_number(arg: &str) -> Result<u32> {
    arg.parse().map_err(|_| Error::InvalidArgument)
}

/// Runs the interpreter until `quit` or the end of input. Returns the
/// process exit code.
pub fn run(users_path: PathBuf, image: Option<PathBuf>) -> i32 {
    let mut shell = Shell::new(users_path);
    if let Some(image) = image {
        match Volume::mount(&image) {
            Ok(vol) => shell.volume = Some(vol),
            Err(e) => eprintln!("mount: {}: {e}", image.display()),
        }
    }
    while let Some(line) = prompt(PROMPT, false) {
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            continue;
        };
        if cmd == "quit" {
            break;
        }
        let args: Vec<&str> = words.collect();
        shell.handle_cmd(cmd, &args);
    }
    if let Some(vol) = shell.volume.take() {
        if let Err(e) = vol.unmount() {
            eprintln!("umount: {e}");
        }
    }
    0
}
