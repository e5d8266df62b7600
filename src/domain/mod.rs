pub mod wallet;

pub use wallet::{
    generate_wallet_code, is_valid_wallet_code, NewTransfer, NewWallet, OwnerId, TransferRecord,
    Wallet, WalletAddressing, WalletRef, WalletWithHistory, WALLET_CODE_LENGTH,
};
