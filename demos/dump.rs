// An example showing how to parse a Password Safe database.
//
// Run as: cargo run --example dump ~/.pwsafe/pwsafe.psafe3 password

use pwsafe::{Header, OpenResult};
use std::env;
use std::fs::File;
use std::io::BufReader;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let filename = &args[1];
    let password = &args[2];

    let file = BufReader::new(File::open(filename).unwrap());

    let (version, header, mut reader) = match pwsafe::open(file, password.as_bytes()).unwrap() {
        OpenResult::Opened {
            version,
            header,
            reader,
        } => (version, header, reader),
        OpenResult::WrongPassphrase => {
            eprintln!("wrong passphrase");
            return;
        }
        OpenResult::WrongFormat => {
            eprintln!("not a recognized Password Safe database");
            return;
        }
    };

    println!("version: {:?}", version);
    match &header {
        Header::V1(_) => println!("format: V1"),
        Header::V2(h) => println!("format: V2, version {}", h.format_version),
        Header::V3(h) => println!("format: V3, iter {}", h.iter),
    }

    while let Some(field) = reader.next().unwrap() {
        println!("{:?}", field);
    }
    reader.finish().unwrap();
}
