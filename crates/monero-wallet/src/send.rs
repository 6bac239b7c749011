//! Send requests.
//!
//! A [`SendRequest`] describes one payment, split payment or sweep. It is
//! built up with the builder methods, validated with [`SendRequest::validate`]
//! (or [`SendRequest::validate_sweep`]) and then handed to a wallet.

use crate::error::WalletError;
use crate::tx::Destination;
use monero_types::constants::{format_amount, parse_amount, DEFAULT_RING_SIZE, MIN_RING_SIZE};
use monero_types::{validate_address, validate_payment_id, Network};
use serde::{Deserialize, Serialize};

/// Fee priority. The numeric value is what the wallet service expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendPriority {
    #[default]
    Default,
    Unimportant,
    Normal,
    Elevated,
}

impl SendPriority {
    pub fn as_u32(self) -> u32 {
        match self {
            SendPriority::Default => 0,
            SendPriority::Unimportant => 1,
            SendPriority::Normal => 2,
            SendPriority::Elevated => 3,
        }
    }

    /// Fee multiplier applied to the base per-byte fee.
    pub fn fee_multiplier(self) -> u64 {
        match self {
            SendPriority::Default | SendPriority::Unimportant => 1,
            SendPriority::Normal => 5,
            SendPriority::Elevated => 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub account_index: u32,
    /// Subaddresses to spend from. Empty means any in the account.
    pub subaddress_indices: Vec<u32>,
    pub destinations: Vec<Destination>,
    pub payment_id: Option<String>,
    pub priority: SendPriority,
    pub ring_size: u32,
    pub unlock_time: u64,
    pub do_not_relay: bool,
    /// Allow the wallet to split the payment over several transactions.
    pub can_split: bool,
    pub sweep_each_subaddress: Option<bool>,
    /// Sweep only outputs below this amount.
    pub below_amount: Option<u64>,
    /// Sweep exactly this output.
    pub key_image: Option<String>,
}

impl Default for SendRequest {
    fn default() -> Self {
        Self {
            account_index: 0,
            subaddress_indices: Vec::new(),
            destinations: Vec::new(),
            payment_id: None,
            priority: SendPriority::Default,
            ring_size: DEFAULT_RING_SIZE,
            unlock_time: 0,
            do_not_relay: false,
            can_split: true,
            sweep_each_subaddress: None,
            below_amount: None,
            key_image: None,
        }
    }
}

impl SendRequest {
    pub fn new(account_index: u32) -> Self {
        Self {
            account_index,
            ..Default::default()
        }
    }

    /// A single payment from `account_index`.
    pub fn payment(account_index: u32, address: &str, amount: u64, priority: SendPriority) -> Self {
        Self::new(account_index).destination(address, amount).priority(priority)
    }

    /// Sweep the unlocked balance of `account_index` to `address`.
    pub fn sweep(account_index: u32, address: &str) -> Self {
        Self::new(account_index).destination(address, 0)
    }

    pub fn destination(mut self, address: &str, amount: u64) -> Self {
        self.destinations.push(Destination::new(address, amount));
        self
    }

    pub fn from_subaddresses(mut self, indices: &[u32]) -> Self {
        self.subaddress_indices = indices.to_vec();
        self
    }

    pub fn priority(mut self, priority: SendPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn ring_size(mut self, ring_size: u32) -> Self {
        self.ring_size = ring_size;
        self
    }

    pub fn unlock_time(mut self, unlock_time: u64) -> Self {
        self.unlock_time = unlock_time;
        self
    }

    pub fn payment_id(mut self, payment_id: &str) -> Self {
        self.payment_id = Some(payment_id.to_string());
        self
    }

    pub fn do_not_relay(mut self, do_not_relay: bool) -> Self {
        self.do_not_relay = do_not_relay;
        self
    }

    pub fn can_split(mut self, can_split: bool) -> Self {
        self.can_split = can_split;
        self
    }

    pub fn below_amount(mut self, amount: u64) -> Self {
        self.below_amount = Some(amount);
        self
    }

    pub fn key_image(mut self, key_image: &str) -> Self {
        self.key_image = Some(key_image.to_string());
        self
    }

    pub fn sweep_each_subaddress(mut self, each: bool) -> Self {
        self.sweep_each_subaddress = Some(each);
        self
    }

    /// Sum of destination amounts.
    pub fn total_amount(&self) -> Result<u64, WalletError> {
        self.destinations.iter().try_fold(0u64, |acc, d| {
            acc.checked_add(d.amount)
                .ok_or_else(|| WalletError::InvalidArgument("destination amounts overflow".into()))
        })
    }

    fn validate_common(&self, network: Option<Network>) -> Result<(), WalletError> {
        if self.ring_size < MIN_RING_SIZE {
            return Err(WalletError::InvalidArgument(format!(
                "ring size {} is below the minimum of {}",
                self.ring_size, MIN_RING_SIZE
            )));
        }
        if let Some(pid) = &self.payment_id {
            validate_payment_id(pid).map_err(|e| WalletError::InvalidArgument(format!("payment id: {}", e)))?;
        }
        for d in &self.destinations {
            let parsed = validate_address(&d.address, network)?;
            if parsed.is_integrated() && self.payment_id.is_some() {
                return Err(WalletError::InvalidArgument(
                    "payment id given together with an integrated address".into(),
                ));
            }
        }
        Ok(())
    }

    /// Validate a payment or split payment.
    pub fn validate(&self, network: Option<Network>) -> Result<(), WalletError> {
        if self.destinations.is_empty() {
            return Err(WalletError::InvalidArgument("no destinations".into()));
        }
        if self.key_image.is_some() || self.below_amount.is_some() {
            return Err(WalletError::InvalidArgument("sweep options on a payment request".into()));
        }
        if let Some(d) = self.destinations.iter().find(|d| d.amount == 0) {
            return Err(WalletError::InvalidArgument(format!("zero amount to {}", d.address)));
        }
        if self.total_amount()? == 0 {
            return Err(WalletError::InvalidArgument("total amount is zero".into()));
        }
        self.validate_common(network)
    }

    /// Validate a sweep: exactly one destination, with no amount.
    pub fn validate_sweep(&self, network: Option<Network>) -> Result<(), WalletError> {
        if self.destinations.len() != 1 {
            return Err(WalletError::InvalidArgument(format!(
                "sweep needs exactly one destination, got {}",
                self.destinations.len()
            )));
        }
        if self.destinations[0].amount != 0 {
            return Err(WalletError::InvalidArgument("sweep destination must not carry an amount".into()));
        }
        self.validate_common(network)
    }

    /// The sweep destination address.
    pub fn sweep_address(&self) -> Result<&str, WalletError> {
        self.destinations
            .first()
            .map(|d| d.address.as_str())
            .ok_or_else(|| WalletError::InvalidArgument("no destinations".into()))
    }

    /// `monero:` payment URI for the single destination of this request.
    pub fn to_uri(&self) -> Result<String, WalletError> {
        let [dest] = self.destinations.as_slice() else {
            return Err(WalletError::InvalidArgument("payment URI needs exactly one destination".into()));
        };
        validate_address(&dest.address, None)?;
        let mut params = Vec::new();
        if let Some(pid) = &self.payment_id {
            validate_payment_id(pid).map_err(|e| WalletError::InvalidArgument(format!("payment id: {}", e)))?;
            params.push(format!("tx_payment_id={}", pid));
        }
        if dest.amount > 0 {
            params.push(format!("tx_amount={}", format_amount(dest.amount)));
        }
        let mut uri = format!("{}{}", URI_SCHEME, dest.address);
        if !params.is_empty() {
            uri.push('?');
            uri.push_str(&params.join("&"));
        }
        Ok(uri)
    }

    /// Parse a `monero:` payment URI. Unknown parameters are ignored.
    pub fn from_uri(uri: &str) -> Result<Self, WalletError> {
        let rest = uri
            .strip_prefix(URI_SCHEME)
            .ok_or_else(|| WalletError::InvalidArgument(format!("not a monero URI: {}", uri)))?;
        let (address, query) = rest.split_once('?').unwrap_or((rest, ""));
        validate_address(address, None)?;
        let mut request = Self::new(0);
        let mut amount = 0;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "tx_amount" => {
                    amount = parse_amount(value)
                        .ok_or_else(|| WalletError::InvalidArgument(format!("bad tx_amount: {}", value)))?;
                }
                "tx_payment_id" => {
                    validate_payment_id(value)
                        .map_err(|e| WalletError::InvalidArgument(format!("payment id: {}", e)))?;
                    request.payment_id = Some(value.to_string());
                }
                _ => {}
            }
        }
        request.destinations.push(Destination::new(address, amount));
        Ok(request)
    }
}

const URI_SCHEME: &str = "monero:";

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "4AYjQM9HoAFNUeC3cvSfgeAN9c3Z8nS3dLM2dCA8shsiQEB3jbxQUEjRmKDoZZG2ubXsxtiE9vZGiu5wPpSV9YSE3FVZcSu";

    #[test]
    fn test_payment_builder() {
        let req = SendRequest::payment(1, ADDR, 5_000, SendPriority::Elevated)
            .from_subaddresses(&[0, 2])
            .ring_size(16)
            .do_not_relay(true);
        assert_eq!(req.account_index, 1);
        assert_eq!(req.total_amount().unwrap(), 5_000);
        assert_eq!(req.priority.as_u32(), 3);
        assert!(req.do_not_relay);
        req.validate(Some(Network::Mainnet)).unwrap();
    }

    #[test]
    fn test_rejects_bad_requests() {
        assert!(matches!(SendRequest::new(0).validate(None), Err(WalletError::InvalidArgument(_))));
        assert!(SendRequest::payment(0, ADDR, 0, SendPriority::Default).validate(None).is_err());
        assert!(SendRequest::payment(0, ADDR, 1, SendPriority::Default)
            .ring_size(6)
            .validate(None)
            .is_err());
        assert!(SendRequest::payment(0, ADDR, 1, SendPriority::Default)
            .payment_id("xyz")
            .validate(None)
            .is_err());
        assert!(matches!(
            SendRequest::payment(0, "4abc", 1, SendPriority::Default).validate(None),
            Err(WalletError::InvalidAddress(_))
        ));
        assert!(matches!(
            SendRequest::payment(0, ADDR, 1, SendPriority::Default).validate(Some(Network::Testnet)),
            Err(WalletError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_overflowing_total() {
        let req = SendRequest::new(0).destination(ADDR, u64::MAX).destination(ADDR, 1);
        assert!(req.total_amount().is_err());
    }

    #[test]
    fn test_sweep_validation() {
        let sweep = SendRequest::sweep(0, ADDR).below_amount(1_000);
        sweep.validate_sweep(None).unwrap();
        assert_eq!(sweep.sweep_address().unwrap(), ADDR);
        assert!(sweep.validate(None).is_err());
        assert!(SendRequest::new(0).validate_sweep(None).is_err());
    }

    #[test]
    fn test_uri_round_trip() {
        let req = SendRequest::payment(0, ADDR, 1_500_000_000_000, SendPriority::Default).payment_id("03284e41c342f032");
        let uri = req.to_uri().unwrap();
        assert_eq!(uri, format!("monero:{}?tx_payment_id=03284e41c342f032&tx_amount=1.5", ADDR));
        let parsed = SendRequest::from_uri(&uri).unwrap();
        assert_eq!(parsed.destinations, req.destinations);
        assert_eq!(parsed.payment_id, req.payment_id);

        let bare = SendRequest::from_uri(&format!("monero:{}?recipient_name=x", ADDR)).unwrap();
        assert_eq!(bare.destinations[0].amount, 0);
        assert!(SendRequest::from_uri("bitcoin:abc").is_err());
    }
}
