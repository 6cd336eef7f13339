use std::fs::{self, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

const BLOCK_SIZE: usize = 4096;
const RENAME_ROUNDS: usize = 3;

/// Overwrite-then-rename-then-delete, to hinder trivial recovery of the
/// file's content and name.
///
/// No-op success when the path no longer exists. Every failure is logged
/// and folded into a `false` return; callers retry at a higher level.
pub fn secure_delete(path: &Path) -> bool {
    if !path.exists() {
        return true;
    }

    match erase(path) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("secure delete of '{}' failed: {}", path.display(), e);
            false
        }
    }
}

fn erase(path: &Path) -> io::Result<()> {
    clear_readonly(path)?;

    let len = fs::metadata(path)?.len();

    {
        let mut file = OpenOptions::new().write(true).open(path)?;

        overwrite_random(&mut file, len)?;
        file.flush()?;
        file.seek(SeekFrom::Start(0))?;

        overwrite_zeros(&mut file, len)?;
        file.flush()?;
        file.sync_all()?;
    }

    let final_name = scramble_name(path)?;
    fs::remove_file(final_name)
}

fn clear_readonly(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

fn overwrite_random(file: &mut fs::File, len: u64) -> io::Result<()> {
    let mut rng = StdRng::from_entropy();
    let mut buffer = [0u8; BLOCK_SIZE];
    let mut remaining = len;

    while remaining > 0 {
        rng.fill_bytes(&mut buffer);
        let step = remaining.min(BLOCK_SIZE as u64) as usize;
        file.write_all(&buffer[..step])?;
        remaining -= step as u64;
    }
    Ok(())
}

fn overwrite_zeros(file: &mut fs::File, len: u64) -> io::Result<()> {
    let buffer = [0u8; BLOCK_SIZE];
    let mut remaining = len;

    while remaining > 0 {
        let step = remaining.min(BLOCK_SIZE as u64) as usize;
        file.write_all(&buffer[..step])?;
        remaining -= step as u64;
    }
    Ok(())
}

/// Rename the file a few times to random names within its directory so the
/// original name is not recoverable from directory entries either.
fn scramble_name(path: &Path) -> io::Result<PathBuf> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;

    let mut rng = StdRng::from_entropy();
    let mut current = path.to_path_buf();

    for _ in 0..RENAME_ROUNDS {
        let name: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(12)
            .map(char::from)
            .collect();
        let next = dir.join(name);
        fs::rename(&current, &next)?;
        current = next;
    }

    Ok(current)
}
