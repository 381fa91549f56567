//! Blocking single GET into a `.part` file.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use curl::easy::Easy;

/// Reason reported when a transfer is stopped through its abort flag.
pub(crate) const USER_CANCELED: &str = "USER_CANCELED";

/// Downloads `url` into `part`. Returns a short failure reason on error.
/// Runs in the current thread; call from `spawn_blocking`.
pub(crate) fn download_to(
    url: &str,
    part: &Path,
    abort: &AtomicBool,
    timeout: Duration,
) -> Result<u64, String> {
    let mut file = File::create(part).map_err(|e| format!("FILE_FAILED: {}", e))?;
    let mut written = 0u64;
    let mut write_err: Option<io::Error> = None;

    let mut easy = Easy::new();
    configure(&mut easy, url, timeout).map_err(|e| format!("NETWORK_FAILED: {}", e))?;
    let performed = perform(&mut easy, &mut file, &mut written, &mut write_err, abort);

    if abort.load(Ordering::Relaxed) {
        return Err(USER_CANCELED.to_string());
    }
    if let Some(e) = write_err {
        return Err(format!("FILE_FAILED: {}", e));
    }
    performed.map_err(|e| format!("NETWORK_FAILED: {}", e))?;

    let code = easy
        .response_code()
        .map_err(|e| format!("NETWORK_FAILED: {}", e))?;
    if !(200..300).contains(&code) {
        return Err(format!("SERVER_BAD_CONTENT: HTTP {}", code));
    }
    file.flush().map_err(|e| format!("FILE_FAILED: {}", e))?;
    Ok(written)
}

fn configure(easy: &mut Easy, url: &str, timeout: Duration) -> Result<(), curl::Error> {
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(timeout)?;
    easy.progress(true)?;
    easy.useragent(concat!("twd/", env!("CARGO_PKG_VERSION")))?;
    Ok(())
}

fn perform(
    easy: &mut Easy,
    file: &mut File,
    written: &mut u64,
    write_err: &mut Option<io::Error>,
    abort: &AtomicBool,
) -> Result<(), curl::Error> {
    let mut transfer = easy.transfer();
    transfer.write_function(|data| match file.write_all(data) {
        Ok(()) => {
            *written += data.len() as u64;
            Ok(data.len())
        }
        Err(e) => {
            *write_err = Some(e);
            Ok(0) // abort transfer
        }
    })?;
    transfer.progress_function(|_, _, _, _| !abort.load(Ordering::Relaxed))?;
    transfer.perform()
}
