use std::path::{Path, PathBuf};

const LOG_ARG: &str = "--sup-hardening-log=";

/// Extract the log directory a VM runtime process writes to, from its
/// command line.
///
/// The runtime passes the log *file* as `--sup-hardening-log=<path>`; when
/// the path contains whitespace the whole argument is wrapped in quotes:
///
/// ```text
/// "--sup-hardening-log=/media/vm pool/win10/Logs/hardening.log"
///  ^                   ^                                      ^
/// arg start         value start                          closing quote
/// ```
///
/// Returns the parent directory of that file, or `None` when the argument
/// is missing or malformed.
pub fn log_dir_from_cmdline(cmdline: &str) -> Option<PathBuf> {
    let arg_start = cmdline.find(LOG_ARG)?;
    let value_start = arg_start + LOG_ARG.len();

    let quoted = arg_start > 0 && cmdline.as_bytes()[arg_start - 1] == b'"';
    let value_end = if quoted {
        cmdline[value_start..].find('"').map(|i| value_start + i)?
    } else {
        cmdline[value_start..]
            .find(' ')
            .map(|i| value_start + i)
            .unwrap_or(cmdline.len())
    };

    if value_start >= value_end {
        return None;
    }

    let file = Path::new(&cmdline[value_start..value_end]);
    match file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Some(dir.to_path_buf()),
        _ => None,
    }
}
