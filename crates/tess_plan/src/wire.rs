//! Cursor-style readers shared by the parameter and message codecs.

pub(crate) fn read_u8_at(data: &[u8], offset: &mut usize) -> anyhow::Result<u8> {
    anyhow::ensure!(*offset + 1 <= data.len(), "payload short u8");
    let value = data[*offset];
    *offset += 1;
    Ok(value)
}

pub(crate) fn read_u32_at(data: &[u8], offset: &mut usize) -> anyhow::Result<u32> {
    anyhow::ensure!(*offset + 4 <= data.len(), "payload short u32");
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[*offset..*offset + 4]);
    *offset += 4;
    Ok(u32::from_be_bytes(buf))
}

pub(crate) fn read_i32_at(data: &[u8], offset: &mut usize) -> anyhow::Result<i32> {
    anyhow::ensure!(*offset + 4 <= data.len(), "payload short i32");
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[*offset..*offset + 4]);
    *offset += 4;
    Ok(i32::from_be_bytes(buf))
}

pub(crate) fn read_u64_at(data: &[u8], offset: &mut usize) -> anyhow::Result<u64> {
    anyhow::ensure!(*offset + 8 <= data.len(), "payload short u64");
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[*offset..*offset + 8]);
    *offset += 8;
    Ok(u64::from_be_bytes(buf))
}

pub(crate) fn read_i64_at(data: &[u8], offset: &mut usize) -> anyhow::Result<i64> {
    anyhow::ensure!(*offset + 8 <= data.len(), "payload short i64");
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[*offset..*offset + 8]);
    *offset += 8;
    Ok(i64::from_be_bytes(buf))
}

pub(crate) fn read_bytes_at<'a>(
    data: &'a [u8],
    offset: &mut usize,
    len: usize,
) -> anyhow::Result<&'a [u8]> {
    anyhow::ensure!(*offset + len <= data.len(), "payload short bytes");
    let slice = &data[*offset..*offset + len];
    *offset += len;
    Ok(slice)
}
