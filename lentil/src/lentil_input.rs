#![allow(dead_code)]

use candle_seq::candle_data_loader::{BOS_ID, EOS_ID, PAD_ID};
use flate2::read::GzDecoder;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};

pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let file = File::open(input_file)?;

    if input_file.ends_with(".gz") {
        let decoder = GzDecoder::new(file);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    let file = File::create(output_file)?;

    if output_file.ends_with(".gz") {
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        Ok(Box::new(BufWriter::new(encoder)))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

///
/// Read a pre-tokenized corpus: one sentence per line, token ids
/// separated by whitespace. Either gzipped or not.
///
/// Ids 0, 1, 2 are reserved for pad/bos/eos and may not appear in the
/// data.
///
pub fn read_token_ids(input_file: &str) -> anyhow::Result<Vec<Vec<u32>>> {
    let buf = open_buf_reader(input_file)?;
    let lines: Vec<String> = buf.lines().collect::<Result<_, _>>()?;

    // parsing takes more time, so split it into parallel jobs
    let sentences: Vec<Vec<u32>> = lines
        .par_iter()
        .map(|line| {
            line.split_whitespace()
                .map(|w| {
                    let id = w
                        .parse::<u32>()
                        .map_err(|_| anyhow::anyhow!("not a token id: '{}'", w))?;
                    if id == PAD_ID || id == BOS_ID || id == EOS_ID {
                        anyhow::bail!("token id {} collides with the reserved pad/bos/eos ids", id);
                    }
                    Ok(id)
                })
                .collect::<anyhow::Result<Vec<u32>>>()
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if sentences.is_empty() {
        anyhow::bail!("empty corpus: {}", input_file);
    }

    Ok(sentences)
}

/// Write one sentence of token ids per line. Either gzipped or not.
pub fn write_token_ids(sentences: &[Vec<u32>], output_file: &str) -> anyhow::Result<()> {
    let mut buf = open_buf_writer(output_file)?;
    for sent in sentences {
        let words: Vec<String> = sent.iter().map(|id| id.to_string()).collect();
        writeln!(buf, "{}", words.join(" "))?;
    }
    buf.flush()?;
    Ok(())
}
