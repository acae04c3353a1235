// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Mint contract ABI.

use alloy::{
    primitives::{Address, Bytes, U256},
    sol,
    sol_types::SolCall,
};

sol! {
    #[sol(rpc)]
    interface IMintable {
        function mint(uint256 quantity) external payable;
        function mintTo(address to, uint256 quantity) external payable;
        function balanceOf(address owner) external view returns (uint256);
    }
}

/// Calldata for minting `quantity` tokens to `dest`.
///
/// The relayer minting to itself uses `mint(quantity)`; anyone else is
/// served through `mintTo(dest, quantity)`.
pub fn mint_calldata(relayer: Address, dest: Address, quantity: U256) -> Bytes {
    if dest == relayer {
        IMintable::mintCall { quantity }.abi_encode().into()
    } else {
        IMintable::mintToCall { to: dest, quantity }
            .abi_encode()
            .into()
    }
}
