//! ABI of the Polygon contracts.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use serde::Deserialize;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface IProjectAdmin {
        function returnProject(uint256 id) external view returns (
            uint256 price,
            uint256 sales,
            uint256 profit,
            uint256 totalSupply,
            address[] holders,
            bool active,
            bool crowdfundingPhase,
            string uri,
            bool isPassive,
            uint256 investorFee,
            uint256 ownerFee
        );

        function buyProject2(uint256 projectId, uint256 amount) external;

        function balanceOf(address account, uint256 id) external view returns (uint256);
    }

    #[derive(Debug, PartialEq, Eq)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);

        function allowance(address owner, address spender) external view returns (uint256);
    }
}

/// Deployed contract addresses.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvmContracts {
    /// Project registry and sale contract.
    pub project_admin: Address,
    /// Stablecoin investments are paid in.
    pub payment_token: Address,
}

pub fn return_project(id: u64) -> Bytes {
    IProjectAdmin::returnProjectCall { id: U256::from(id) }
        .abi_encode()
        .into()
}

pub fn buy_project(project_id: u64, amount: U256) -> Bytes {
    IProjectAdmin::buyProject2Call {
        projectId: U256::from(project_id),
        amount,
    }
    .abi_encode()
    .into()
}

pub fn balance_of(account: Address, id: u64) -> Bytes {
    IProjectAdmin::balanceOfCall {
        account,
        id: U256::from(id),
    }
    .abi_encode()
    .into()
}

pub fn approve(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

pub fn allowance(owner: Address, spender: Address) -> Bytes {
    IERC20::allowanceCall { owner, spender }.abi_encode().into()
}
