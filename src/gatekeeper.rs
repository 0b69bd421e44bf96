#![deny(unsafe_code, rust_2018_idioms)]

mod plumbing;

fn main() -> anyhow::Result<()> {
    plumbing::main()
}
