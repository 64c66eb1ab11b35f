//! Content-Length probing: a single GET issued against the first URL, whose
//! body is discarded as soon as the headers have been read.
//!
//! A `HEAD` would be cheaper, but some origins answer `HEAD` and `GET`
//! differently (dynamic redirects, CDNs that only set `Content-Length` on a
//! real `GET`), so the coordinator probes with the same method it will use
//! for the real range fetches.

use crate::error::FatalError;
use std::str;
use std::time::Duration;

/// Issues a GET against `url`, reads just enough of the response to learn
/// `Content-Length`, and aborts the transfer before the body is fully
/// downloaded. A `Content-Length` of zero, or its absence, is fatal.
pub fn probe_content_length(
    url: &str,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<u64, FatalError> {
    let mut content_length: Option<u64> = None;

    let mut easy = curl::easy::Easy::new();
    easy.url(url)
        .map_err(|e| FatalError::Probe(format!("invalid URL: {e}")))?;
    easy.follow_location(true)
        .map_err(|e| FatalError::Probe(e.to_string()))?;
    easy.connect_timeout(connect_timeout)
        .map_err(|e| FatalError::Probe(e.to_string()))?;
    easy.low_speed_limit(1)
        .map_err(|e| FatalError::Probe(e.to_string()))?;
    easy.low_speed_time(read_timeout)
        .map_err(|e| FatalError::Probe(e.to_string()))?;

    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(line) = str::from_utf8(data) {
                    if let Some((name, value)) = line.trim_end().split_once(':') {
                        if name.trim().eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse::<u64>().ok();
                        }
                    }
                }
                true
            })
            .map_err(|e| FatalError::Probe(e.to_string()))?;
        transfer
            .write_function(|_data| {
                // Headers are fully parsed by the time any body byte arrives;
                // abort the transfer now rather than downloading the body twice.
                Ok(0)
            })
            .map_err(|e| FatalError::Probe(e.to_string()))?;

        match transfer.perform() {
            Ok(()) => {}
            Err(e) if e.is_write_error() => {}
            Err(e) => return Err(FatalError::Probe(e.to_string())),
        }
    }

    let code = easy
        .response_code()
        .map_err(|e| FatalError::Probe(e.to_string()))?;
    if !(200..300).contains(&code) {
        return Err(FatalError::Probe(format!("probe GET returned HTTP {code}")));
    }

    match content_length {
        Some(n) if n > 0 => Ok(n),
        _ => Err(FatalError::Probe(
            "Content-Length is zero or unknown".to_string(),
        )),
    }
}
