#[cfg(any(
    feature = "compression-gzip",
    feature = "compression-zstd",
    feature = "compression-bzip2",
    feature = "compression-xz"
))]
mod compression_tests {
    use anyhow::Result;
    use iolite::io::compression::{
        auto_detect_reader, codec_by_name, register_codec, CompressionCodec, FinishWrite,
    };
    use iolite::*;
    use std::io::{Read, Write};
    use std::path::Path;
    use std::sync::Arc;

    fn sample_lines() -> Vec<String> {
        (0..200).map(|i| format!("record {i}: the same words again")).collect()
    }

    fn roundtrip_text(path: &Path) -> Result<()> {
        let lines = sample_lines();
        write_text_lines(path, &lines, &TextOptions::default())?;

        let raw = std::fs::read(path)?;
        let plain_len: usize = lines.iter().map(|l| l.len() + 1).sum();
        assert!(raw.len() < plain_len, "{} is not compressed", path.display());

        let back: Vec<String> =
            read_text_lines(path, &TextOptions::default())?.collect::<Result<_>>()?;
        assert_eq!(back, lines);
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_text_roundtrip() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        roundtrip_text(&tmp.path().join("lines.txt.gz"))
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn zstd_text_roundtrip() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        roundtrip_text(&tmp.path().join("lines.txt.zst"))
    }

    #[cfg(feature = "compression-bzip2")]
    #[test]
    fn bzip2_text_roundtrip() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        roundtrip_text(&tmp.path().join("lines.txt.bz2"))
    }

    #[cfg(feature = "compression-xz")]
    #[test]
    fn xz_text_roundtrip() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        roundtrip_text(&tmp.path().join("LINES.TXT.XZ"))
    }

    #[cfg(all(feature = "compression-gzip", feature = "io-jsonl"))]
    #[test]
    fn gzip_jsonl_roundtrip() -> Result<()> {
        use serde_json::json;
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("events.jsonl.gz");
        let data = vec![json!({"id": 1, "name": "Zoë"}), json!({"id": 2})];

        write_json_lines(&path, &data, &JsonLinesWriteOptions::default())?;
        let back: Vec<_> = read_json_lines(&path, &JsonLinesReadOptions::default())?
            .collect::<Result<_>>()?;
        assert_eq!(back, data);
        Ok(())
    }

    #[cfg(all(feature = "compression-zstd", feature = "io-csv"))]
    #[test]
    fn zstd_csv_roundtrip() -> Result<()> {
        use serde_json::json;
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("rows.csv.zst");
        let rows = vec![json!(["a", "b"]), json!(["1", "2"])];

        write_csv_lines(&path, &rows, &CsvWriteOptions::default())?;
        let back: Vec<_> =
            read_csv_lines(&path, &CsvReadOptions::default())?.collect::<Result<_>>()?;
        assert_eq!(back, rows);
        Ok(())
    }

    #[test]
    fn plain_files_pass_through() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("lines.txt");
        write_text_lines(&path, ["BZ is not bzip2", "x"], &TextOptions::default())?;
        assert_eq!(std::fs::read_to_string(&path)?, "BZ is not bzip2\nx\n");

        let back: Vec<String> =
            read_text_lines(&path, &TextOptions::default())?.collect::<Result<_>>()?;
        assert_eq!(back, vec!["BZ is not bzip2", "x"]);
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn magic_bytes_detect_gzip_without_extension() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let gz = tmp.path().join("lines.txt.gz");
        let disguised = tmp.path().join("lines.dat");
        write_text_lines(&gz, ["one", "two"], &TextOptions::default())?;
        std::fs::rename(&gz, &disguised)?;

        let back: Vec<String> =
            read_text_lines(&disguised, &TextOptions::default())?.collect::<Result<_>>()?;
        assert_eq!(back, vec!["one", "two"]);
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn short_input_is_not_mistaken_for_a_codec() -> Result<()> {
        let data: &[u8] = &[0x1f];
        let mut reader = auto_detect_reader(std::io::Cursor::new(data), "short.dat", None)?;
        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        assert_eq!(out, data);
        Ok(())
    }

    #[test]
    fn lookup_by_name_is_case_insensitive() {
        #[cfg(feature = "compression-gzip")]
        assert_eq!(codec_by_name("GZIP").map(|c| c.name().to_string()), Some("gzip".into()));
        #[cfg(feature = "compression-zstd")]
        assert!(codec_by_name("zstd").is_some());
        assert!(codec_by_name("no-such-codec").is_none());
    }

    /// Flips every byte; enough to prove the codec ran.
    struct XorCodec;

    struct XorReader(Box<dyn Read>);

    impl Read for XorReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.0.read(buf)?;
            buf[..n].iter_mut().for_each(|b| *b ^= 0xff);
            Ok(n)
        }
    }

    struct XorWriter(Box<dyn Write>);

    impl Write for XorWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let flipped: Vec<u8> = buf.iter().map(|b| b ^ 0xff).collect();
            self.0.write_all(&flipped)?;
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.0.flush()
        }
    }

    impl FinishWrite for XorWriter {
        fn finish(mut self: Box<Self>) -> std::io::Result<()> {
            self.flush()
        }
    }

    impl CompressionCodec for XorCodec {
        fn name(&self) -> &str {
            "xor"
        }

        fn extensions(&self) -> &[&str] {
            &[".xor"]
        }

        fn magic_bytes(&self) -> Option<&[u8]> {
            None
        }

        fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
            Ok(Box::new(XorReader(reader)))
        }

        fn wrap_writer_dyn(
            &self,
            writer: Box<dyn Write>,
            _level: Option<u32>,
        ) -> std::io::Result<Box<dyn FinishWrite>> {
            Ok(Box::new(XorWriter(writer)))
        }
    }

    #[test]
    fn registered_codec_is_used_by_readers_and_writers() -> Result<()> {
        register_codec(Arc::new(XorCodec));
        assert!(codec_by_name("xor").is_some());

        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("lines.txt.xor");
        write_text_lines(&path, ["ab"], &TextOptions::default())?;
        assert_eq!(std::fs::read(&path)?, vec![b'a' ^ 0xff, b'b' ^ 0xff, b'\n' ^ 0xff]);

        let back: Vec<String> =
            read_text_lines(&path, &TextOptions::default())?.collect::<Result<_>>()?;
        assert_eq!(back, vec!["ab"]);
        Ok(())
    }

    /// Accepts every write and fails when the stream is completed, like a
    /// compressor whose trailer hits a full disk.
    struct BrokenTrailerCodec;

    struct BrokenTrailer(Box<dyn Write>);

    impl Write for BrokenTrailer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.0.flush()
        }
    }

    impl FinishWrite for BrokenTrailer {
        fn finish(self: Box<Self>) -> std::io::Result<()> {
            Err(std::io::Error::other("no space left for trailer"))
        }
    }

    impl CompressionCodec for BrokenTrailerCodec {
        fn name(&self) -> &str {
            "broken-trailer"
        }

        fn extensions(&self) -> &[&str] {
            &[".broken"]
        }

        fn magic_bytes(&self) -> Option<&[u8]> {
            None
        }

        fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
            Ok(reader)
        }

        fn wrap_writer_dyn(
            &self,
            writer: Box<dyn Write>,
            _level: Option<u32>,
        ) -> std::io::Result<Box<dyn FinishWrite>> {
            Ok(Box::new(BrokenTrailer(writer)))
        }
    }

    #[test]
    fn failure_to_finish_a_stream_is_reported() -> Result<()> {
        register_codec(Arc::new(BrokenTrailerCodec));
        let tmp = tempfile::tempdir()?;

        let err = write_text_lines(tmp.path().join("a.txt.broken"), ["x"], &TextOptions::default())
            .unwrap_err();
        assert!(format!("{err:#}").contains("no space left for trailer"));

        #[cfg(feature = "io-jsonl")]
        assert!(
            write_json_lines(
                tmp.path().join("b.jsonl.broken"),
                vec![serde_json::json!(1)],
                &JsonLinesWriteOptions::default()
            )
            .is_err()
        );
        #[cfg(feature = "io-csv")]
        assert!(
            write_csv_lines(
                tmp.path().join("c.csv.broken"),
                vec![vec!["a"]],
                &CsvWriteOptions::default()
            )
            .is_err()
        );
        assert!(
            write_json(
                tmp.path().join("d.json.broken"),
                &serde_json::json!({}),
                &JsonWriteOptions::default()
            )
            .is_err()
        );
        Ok(())
    }

    #[cfg(feature = "compression-bzip2")]
    #[test]
    fn magic_bytes_detect_bzip2_without_extension() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let bz = tmp.path().join("lines.txt.bz2");
        let disguised = tmp.path().join("lines.dat");
        write_text_lines(&bz, ["one", "two"], &TextOptions::default())?;
        std::fs::rename(&bz, &disguised)?;

        let back: Vec<String> =
            read_text_lines(&disguised, &TextOptions::default())?.collect::<Result<_>>()?;
        assert_eq!(back, vec!["one", "two"]);

        // An empty bzip2 stream carries the end-of-stream marker instead of a block.
        let empty = tmp.path().join("empty.bz2");
        let empty_plain = tmp.path().join("empty.dat");
        write_text_lines(&empty, Vec::<String>::new(), &TextOptions::default())?;
        std::fs::rename(&empty, &empty_plain)?;
        let back: Vec<String> =
            read_text_lines(&empty_plain, &TextOptions::default())?.collect::<Result<_>>()?;
        assert!(back.is_empty());
        Ok(())
    }
}

#[cfg(not(any(
    feature = "compression-gzip",
    feature = "compression-zstd",
    feature = "compression-bzip2",
    feature = "compression-xz"
)))]
#[test]
fn compression_tests_skipped() {}
