// An example showing how to change the password of a V3 database.

use pwsafe::OpenResult;
use std::fs::File;
use std::io::{BufReader, BufWriter};

fn main() {
    env_logger::init();

    let rfilename = "pwsafe.psafe3";
    let wfilename = "pwsafe.new.psafe3";

    let rfile = BufReader::new(File::open(rfilename).unwrap());
    let wfile = BufWriter::new(File::create(wfilename).unwrap());

    let (iter, mut reader) = match pwsafe::open(rfile, b"password").unwrap() {
        OpenResult::Opened {
            header: pwsafe::Header::V3(header),
            reader,
            ..
        } => (header.iter, reader),
        OpenResult::Opened { .. } => panic!("only V3 databases can be rekeyed"),
        OpenResult::WrongPassphrase => panic!("wrong passphrase"),
        OpenResult::WrongFormat => panic!("not a recognized Password Safe database"),
    };

    let mut fields = Vec::new();
    while let Some(field) = reader.next().unwrap() {
        fields.push(field);
    }
    reader.finish().unwrap();

    pwsafe::write(wfile, b"test", iter, &[], fields.into_iter()).unwrap();
}
