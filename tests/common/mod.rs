use std::io::Write;

/// Write a CSV to a temp file (kept alive by the returned handle).
pub fn write_csv(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".csv")
        .tempfile()
        .expect("temp file");
    file.write_all(content.as_bytes()).expect("write csv");
    file
}

/// A small sales table with a missing value, a duplicate row, and a
/// numeric-looking text column.
pub fn sample_sales_csv() -> tempfile::NamedTempFile {
    write_csv(
        "region,month,sales,rating\n\
         north,jan,100,4.5\n\
         south,jan,80,3.0\n\
         north,feb,,4.0\n\
         south,feb,120,5.0\n\
         north,jan,100,4.5\n\
         east,feb,90,2.5\n",
    )
}
