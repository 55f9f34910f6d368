//! Client side of the on-chain project program: account layouts, PDA seeds
//! and instruction builders.

use crate::{
    define_discriminator,
    utils::{decode_anchor_account, ANCHOR_DISCRIMINATOR_BYTE_SIZE},
};
use anchor_spl::associated_token::get_associated_token_address;
use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program, sysvar,
};

pub const PROJECT_SEED: &[u8] = b"project";
pub const INVESTOR_SEED: &[u8] = b"investor";
pub const MINT_PROJECT_SEED: &[u8] = b"mint_project";
pub const TOKEN_ACCOUNT_SEED: &[u8] = b"token_account";

define_discriminator!(
    ProjectAccount,
    account,
    "ProjectAccount",
    [179, 110, 82, 178, 208, 35, 171, 116]
);
define_discriminator!(Investor, account, "Investor", [174, 129, 17, 83, 36, 116, 26, 196]);
define_discriminator!(
    InvestProject,
    instruction,
    "invest_project",
    [112, 86, 253, 81, 102, 184, 11, 178]
);
define_discriminator!(
    WithdrawInvestor,
    instruction,
    "withdraw_investor",
    [174, 148, 15, 37, 53, 118, 254, 178]
);

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProjectAccount {
    pub project_id: u64,
    pub owner: Pubkey,
    /// Mint the shares are paid with.
    pub token_sell: Pubkey,
    /// Per share, in units of `token_sell`.
    pub price: u64,
    pub metadata_uri: String,
    pub shares_sold: u64,
    pub shares: u64,
    pub token: Pubkey,
    pub fee_investor: u64,
    pub fee_project: u64,
    pub is_pasive_project: bool,
    pub is_active: bool,
    pub recolected: u64,
    pub gains: u64,
    pub fees: u64,
}

impl ProjectAccount {
    pub fn decode(data: &[u8]) -> anyhow::Result<Self> {
        decode_anchor_account(&PROJECT_ACCOUNT_DISCRIMINATOR, data)
    }
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct InvestorAccount {
    pub shares: u64,
    pub amount_withdrawn: u64,
    pub project: Pubkey,
    pub owner: Pubkey,
}

impl InvestorAccount {
    pub fn decode(data: &[u8]) -> anyhow::Result<Self> {
        decode_anchor_account(&INVESTOR_DISCRIMINATOR, data)
    }
}

/// PDA derivation for one deployment of the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramAddresses {
    pub program_id: Pubkey,
}

impl ProgramAddresses {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub fn project(&self, project_id: u64) -> Pubkey {
        Pubkey::find_program_address(&[PROJECT_SEED, &project_id.to_le_bytes()], &self.program_id).0
    }

    pub fn investor(&self, owner: &Pubkey, project_id: u64) -> Pubkey {
        Pubkey::find_program_address(
            &[INVESTOR_SEED, owner.as_ref(), &project_id.to_le_bytes()],
            &self.program_id,
        )
        .0
    }

    /// Mint of the project's share tokens.
    pub fn mint_project(&self, project_id: u64) -> Pubkey {
        let project = self.project(project_id);
        Pubkey::find_program_address(
            &[MINT_PROJECT_SEED, project.as_ref(), &project_id.to_le_bytes()],
            &self.program_id,
        )
        .0
    }

    /// Vault collecting payments in `payment_mint`.
    pub fn project_token_account(&self, project_id: u64, payment_mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[
                TOKEN_ACCOUNT_SEED,
                &project_id.to_le_bytes(),
                payment_mint.as_ref(),
            ],
            &self.program_id,
        )
        .0
    }
}

/// Accounts touched by both investor instructions, in program order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvestorAccounts {
    pub investor: Pubkey,
    pub project: Pubkey,
    pub investor_account: Pubkey,
    pub mint_project: Pubkey,
    pub investor_share_account: Pubkey,
    pub payment_mint: Pubkey,
    pub investor_payment_account: Pubkey,
    pub project_token_account: Pubkey,
    /// Associated token account of the project PDA for the payment mint.
    pub project_payment_account: Pubkey,
}

impl InvestorAccounts {
    pub fn derive(
        addresses: &ProgramAddresses,
        investor: Pubkey,
        project_id: u64,
        project: &ProjectAccount,
    ) -> Self {
        let project_address = addresses.project(project_id);
        let mint_project = addresses.mint_project(project_id);
        let payment_mint = project.token_sell;
        Self {
            investor,
            project: project_address,
            investor_account: addresses.investor(&investor, project_id),
            mint_project,
            investor_share_account: get_associated_token_address(&investor, &mint_project),
            payment_mint,
            investor_payment_account: get_associated_token_address(&investor, &payment_mint),
            project_token_account: addresses.project_token_account(project_id, &payment_mint),
            project_payment_account: get_associated_token_address(&project_address, &payment_mint),
        }
    }

    fn metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(self.investor, true),
            AccountMeta::new(self.project, false),
            AccountMeta::new(self.investor_account, false),
            AccountMeta::new(self.mint_project, false),
            AccountMeta::new(self.investor_share_account, false),
            AccountMeta::new_readonly(self.payment_mint, false),
            AccountMeta::new(self.investor_payment_account, false),
            AccountMeta::new(self.project_token_account, false),
            AccountMeta::new(self.project_payment_account, false),
            AccountMeta::new_readonly(anchor_spl::token::ID, false),
            AccountMeta::new_readonly(anchor_spl::associated_token::ID, false),
            AccountMeta::new_readonly(system_program::ID, false),
            AccountMeta::new_readonly(sysvar::rent::ID, false),
        ]
    }

    /// Accounts whose write locks drive the local fee market.
    pub fn writable(&self) -> Vec<Pubkey> {
        vec![
            self.project,
            self.investor_account,
            self.mint_project,
            self.project_token_account,
            self.project_payment_account,
        ]
    }
}

#[derive(BorshSerialize)]
struct InvestProjectArgs {
    project_id: u64,
    shares: u64,
}

#[derive(BorshSerialize)]
struct WithdrawInvestorArgs {
    project_id: u64,
}

fn instruction_data(discriminator: [u8; 8], args: &impl BorshSerialize) -> Vec<u8> {
    let mut data = Vec::with_capacity(ANCHOR_DISCRIMINATOR_BYTE_SIZE + 16);
    data.extend_from_slice(&discriminator);
    args.serialize(&mut data)
        .expect("invariant: writing to a vec cannot fail");
    data
}

pub fn invest_project(
    addresses: &ProgramAddresses,
    accounts: &InvestorAccounts,
    project_id: u64,
    shares: u64,
) -> Instruction {
    Instruction {
        program_id: addresses.program_id,
        accounts: accounts.metas(),
        data: instruction_data(
            INVEST_PROJECT_DISCRIMINATOR,
            &InvestProjectArgs { project_id, shares },
        ),
    }
}

pub fn withdraw_investor(
    addresses: &ProgramAddresses,
    accounts: &InvestorAccounts,
    project_id: u64,
) -> Instruction {
    Instruction {
        program_id: addresses.program_id,
        accounts: accounts.metas(),
        data: instruction_data(
            WITHDRAW_INVESTOR_DISCRIMINATOR,
            &WithdrawInvestorArgs { project_id },
        ),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn sample_project(project_id: u64) -> ProjectAccount {
        ProjectAccount {
            project_id,
            owner: Pubkey::new_unique(),
            token_sell: Pubkey::new_unique(),
            price: 45_000_000,
            metadata_uri: String::new(),
            shares_sold: 40,
            shares: 100,
            token: Pubkey::new_unique(),
            fee_investor: 0,
            fee_project: 0,
            is_pasive_project: false,
            is_active: true,
            recolected: 1_800_000_000,
            gains: 0,
            fees: 0,
        }
    }

    pub fn encode_account(discriminator: [u8; 8], account: &impl BorshSerialize) -> Vec<u8> {
        let mut data = discriminator.to_vec();
        account.serialize(&mut data).expect("serialize");
        data
    }

    #[test]
    fn test_project_account_layout() -> anyhow::Result<()> {
        let project = sample_project(7);
        let data = encode_account(PROJECT_ACCOUNT_DISCRIMINATOR, &project);
        // discriminator, u64, 2 keys, u64, empty string, 2 u64, key, 2 u64, 2 bools, 3 u64
        assert_eq!(data.len(), 8 + 8 + 64 + 8 + 4 + 16 + 32 + 16 + 2 + 24);
        assert_eq!(&data[8..16], &7u64.to_le_bytes());
        assert_eq!(ProjectAccount::decode(&data)?, project);
        assert!(InvestorAccount::decode(&data).is_err());
        Ok(())
    }

    #[test]
    fn test_pdas_are_deterministic() {
        let addresses = ProgramAddresses::new(Pubkey::new_unique());
        let owner = Pubkey::new_unique();
        assert_eq!(addresses.project(1), addresses.project(1));
        assert_ne!(addresses.project(1), addresses.project(2));
        assert_ne!(addresses.investor(&owner, 1), addresses.investor(&owner, 2));
        assert_ne!(addresses.mint_project(1), addresses.project(1));

        let expected = Pubkey::find_program_address(
            &[b"project", &1u64.to_le_bytes()],
            &addresses.program_id,
        )
        .0;
        assert_eq!(addresses.project(1), expected);
    }

    #[test]
    fn test_invest_instruction() {
        let addresses = ProgramAddresses::new(Pubkey::new_unique());
        let investor = Pubkey::new_unique();
        let project = sample_project(3);
        let accounts = InvestorAccounts::derive(&addresses, investor, 3, &project);
        assert_eq!(accounts.payment_mint, project.token_sell);
        assert_eq!(
            accounts.investor_payment_account,
            get_associated_token_address(&investor, &project.token_sell)
        );
        assert_eq!(
            accounts.project_payment_account,
            get_associated_token_address(&addresses.project(3), &project.token_sell)
        );
        assert_ne!(accounts.project_payment_account, accounts.project_token_account);

        let ix = invest_project(&addresses, &accounts, 3, 25);
        assert_eq!(ix.program_id, addresses.program_id);
        assert_eq!(&ix.data[..8], &INVEST_PROJECT_DISCRIMINATOR);
        assert_eq!(&ix.data[8..16], &3u64.to_le_bytes());
        assert_eq!(&ix.data[16..24], &25u64.to_le_bytes());
        assert!(ix.accounts[0].is_signer);
        assert_eq!(ix.accounts[0].pubkey, investor);
        let program_ata = ix
            .accounts
            .iter()
            .find(|meta| meta.pubkey == accounts.project_payment_account)
            .expect("project payment account passed");
        assert!(program_ata.is_writable);
        assert!(accounts.writable().contains(&accounts.project_payment_account));

        let withdraw = withdraw_investor(&addresses, &accounts, 3);
        assert_eq!(&withdraw.data[..8], &WITHDRAW_INVESTOR_DISCRIMINATOR);
        assert_eq!(withdraw.data.len(), 16);
    }
}
