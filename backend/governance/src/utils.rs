use std::sync::LazyLock;

use regex::Regex;

static ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-f]{40}$").expect("address pattern"));

/// Lower-cased form of an account address, the way subgraphs index them.
/// `None` when the input is not a 20-byte hex address.
pub fn normalize_address(input: &str) -> Option<String> {
    let address = input.trim().to_lowercase();

    ADDRESS.is_match(&address).then_some(address)
}
