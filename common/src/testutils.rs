/// Deterministic, non-repeating-per-chunk content so that shifted or truncated data never matches.
pub fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i * 31 + i / 251 + usize::from(seed)) % 251) as u8)
        .collect()
}

pub async fn create_temp_dir() -> anyhow::Result<std::path::PathBuf> {
    let mut idx = 0;
    loop {
        let tmp_dir = std::env::temp_dir().join(format!("mfcmp_test{}", &idx));
        if let Err(error) = tokio::fs::create_dir(&tmp_dir).await {
            match error.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    idx += 1;
                }
                _ => return Err(error.into()),
            }
        } else {
            return Ok(tmp_dir);
        }
    }
}

pub async fn write_file(path: &std::path::Path, contents: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(path, contents).await?;
    Ok(())
}

/// Creates `foo` and `bar` side by side in a fresh temp dir:
///
/// foo                 bar
/// |- same{0..10}      |- same{0..10}     (identical, various sizes)
/// |- diff_size        |- diff_size       (bar is one byte shorter)
/// |- diff_first       |- diff_first      (first byte differs)
/// |- diff_boundary    |- diff_boundary   (byte after the first chunk differs)
/// |- missing0         x
/// |- missing1         x
pub async fn setup_test_dirs(chunk_size: usize) -> anyhow::Result<std::path::PathBuf> {
    let tmp_dir = create_temp_dir().await?;
    let foo = tmp_dir.join("foo");
    let bar = tmp_dir.join("bar");
    tokio::fs::create_dir(&foo).await?;
    tokio::fs::create_dir(&bar).await?;
    let sizes = [
        0,
        1,
        chunk_size - 1,
        chunk_size,
        chunk_size + 1,
        2 * chunk_size,
        3 * chunk_size + 17,
        7,
        100,
        10 * chunk_size,
    ];
    for (i, size) in sizes.iter().enumerate() {
        let data = patterned(*size, i as u8);
        write_file(&foo.join(format!("same{i}")), &data).await?;
        write_file(&bar.join(format!("same{i}")), &data).await?;
    }
    let data = patterned(2 * chunk_size, 42);
    write_file(&foo.join("diff_size"), &data).await?;
    write_file(&bar.join("diff_size"), &data[..data.len() - 1]).await?;
    let mut other = data.clone();
    other[0] ^= 1;
    write_file(&foo.join("diff_first"), &data).await?;
    write_file(&bar.join("diff_first"), &other).await?;
    let mut other = data.clone();
    other[chunk_size] ^= 1;
    write_file(&foo.join("diff_boundary"), &data).await?;
    write_file(&bar.join("diff_boundary"), &other).await?;
    write_file(&foo.join("missing0"), &data).await?;
    write_file(&foo.join("missing1"), b"").await?;
    Ok(tmp_dir)
}
