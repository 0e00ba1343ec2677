use std::io::Read;

/// Size of the buffer used when streaming file content in and out of blocks.
pub const COPY_BUF_SIZE: usize = 64 << 10;

/// Read until `buf` is full or the reader is exhausted.
///
/// Returns whether end of input was hit along with the number of bytes placed in `buf`.
pub fn fill_buf<R: Read>(data: &mut R, buf: &mut [u8]) -> std::io::Result<(bool, usize)> {
    let mut buf_read = 0;

    while buf_read < buf.len() {
        match data.read(&mut buf[buf_read..]) {
            Ok(0) => return Ok((true, buf_read)),
            Ok(x) => buf_read += x,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => (),
            Err(e) => return Err(e),
        };
    }
    Ok((false, buf_read))
}
