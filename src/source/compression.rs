//! Compression detection and decompressing readers.

use std::io::Read;

use url::Url;

use crate::spec::Compression;

/// Resolve the compression of a file from its name and the spec's hint.
///
/// An explicit hint wins. Under `Auto`, the `.gz` and `.bz`/`.bz2`
/// suffixes are checked first on the raw name, then on the name's URI
/// path component (so `data.csv.gz?sig=...` still reads as gzip).
pub fn guess_compression_from_name(name: &str, hint: Compression) -> Compression {
    if hint != Compression::Auto {
        return hint;
    }
    if name.ends_with(".gz") {
        Compression::Gzip
    } else if name.ends_with(".bz2") || name.ends_with(".bz") {
        Compression::Bzip
    } else {
        match Url::parse(name) {
            Ok(parsed) if parsed.path() != name => {
                guess_compression_from_name(parsed.path(), hint)
            }
            _ => Compression::None,
        }
    }
}

/// Wrap a reader in the decompressor for the file's detected format.
///
/// Header failures surface as IO errors on the first read, fatal for the
/// file.
pub fn decompressing_reader(
    input: Box<dyn Read + Send>,
    name: &str,
    hint: Compression,
) -> Box<dyn Read + Send> {
    match guess_compression_from_name(name, hint) {
        // Multistream, matching concatenated gzip members.
        Compression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(input)),
        Compression::Bzip => Box::new(bzip2::read::BzDecoder::new(input)),
        Compression::Auto | Compression::None => input,
    }
}
