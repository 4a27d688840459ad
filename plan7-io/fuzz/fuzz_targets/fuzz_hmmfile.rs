#![no_main]
use libfuzzer_sys::fuzz_target;
use std::io::Write;

fuzz_target!(|data: &[u8]| {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(data).unwrap();
    f.flush().unwrap();
    if let Ok(mut file) = plan7_io::HmmFile::open(f.path(), None) {
        let mut alphabet = None;
        while let Ok(Some(_)) = file.read_next(&mut alphabet) {}
    }
});
