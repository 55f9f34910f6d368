use anyhow::{ensure, Context as _};
use borsh::BorshDeserialize;

/// Mirrors anchor's account codegen: first 8 bytes of `sha256("account:<Name>")`.
pub fn anchor_account_discriminator(account_struct_name: &str) -> [u8; 8] {
    sighash("account", account_struct_name)
}

/// Mirrors anchor's instruction codegen: first 8 bytes of `sha256("global:<name>")`.
pub fn anchor_instruction_discriminator(instruction_name: &str) -> [u8; 8] {
    sighash("global", instruction_name)
}

fn sighash(namespace: &str, name: &str) -> [u8; 8] {
    let preimage = format!("{namespace}:{name}").into_bytes();
    let hash = anchor_syn::hash::hash(&preimage);
    let mut discriminator = [0u8; ANCHOR_DISCRIMINATOR_BYTE_SIZE];
    discriminator.copy_from_slice(&hash.0[..ANCHOR_DISCRIMINATOR_BYTE_SIZE]);
    discriminator
}

/// Defines a static discriminator and a test pinning it to the anchor hash.
#[macro_export]
macro_rules! define_discriminator {
    ($t:ident, $kind:ident, $name:expr, $v:expr) => {
        paste::paste! {
            pub const [<$t:snake:upper _DISCRIMINATOR>]: [u8; 8] = $v;

            #[cfg(test)]
            #[allow(non_snake_case)]
            mod [<$t:snake _discriminator_equality_test>] {
                #[test]
                fn [<it_tests_ $t:snake _discriminator_equality>]() {
                    assert_eq!(
                        super::[<$t:snake:upper _DISCRIMINATOR>],
                        $crate::utils::[<anchor_ $kind _discriminator>]($name)
                    );
                }
            }
        }
    };
}

pub const ANCHOR_DISCRIMINATOR_BYTE_SIZE: usize = 8;

/// Checks the discriminator and decodes the borsh body of an anchor account.
/// Trailing bytes are allowed, accounts are often allocated with padding.
pub fn decode_anchor_account<T: BorshDeserialize>(
    discriminator: &[u8; 8],
    data: &[u8],
) -> anyhow::Result<T> {
    ensure!(
        data.len() >= ANCHOR_DISCRIMINATOR_BYTE_SIZE,
        "account data is too short: {} bytes",
        data.len()
    );
    let (head, mut body) = data.split_at(ANCHOR_DISCRIMINATOR_BYTE_SIZE);
    ensure!(
        head == discriminator,
        "account discriminator mismatch: {head:?}"
    );
    T::deserialize(&mut body).context("decode account body")
}
