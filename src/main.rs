use std::env::args;

use eyre::Result;
use lpddr5x_sim::main_inner;

fn main() -> Result<()> {
    main_inner(args())
}
