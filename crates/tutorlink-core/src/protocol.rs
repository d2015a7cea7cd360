//! GATT service contract and wire-level constants

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Service, Characteristic and Descriptor UUIDs
// ----------------------------------------------------------------------------

/// Primary service exposed by the tutor peripheral firmware
pub const TUTOR_SERVICE_UUID: Uuid = Uuid::from_u128(0x19B10000_E8F2_537E_4F6C_D104768A1214);

/// Characteristic used for both outbound writes and inbound notifications
pub const TUTOR_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x19B10001_E8F2_537E_4F6C_D104768A1214);

/// Standard Client Characteristic Configuration Descriptor
pub const CLIENT_CONFIG_DESCRIPTOR_UUID: Uuid =
    Uuid::from_u128(0x00002902_0000_1000_8000_00805F9B34FB);

// ----------------------------------------------------------------------------
// Transfer Constants
// ----------------------------------------------------------------------------

/// Reference bound for a single characteristic write
pub const DEFAULT_MAX_CHUNK_LEN: usize = 300;

/// Default discovery window in milliseconds
pub const DEFAULT_SCAN_DURATION_MS: u64 = 1000;

/// Terminator appended to every outbound message before chunking
pub const MESSAGE_TERMINATOR: char = '$';

// ----------------------------------------------------------------------------
// GATT Primitives
// ----------------------------------------------------------------------------

/// Completion status reported by the transport for a GATT operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattStatus {
    Success,
    Failure { reason: String },
}

impl GattStatus {
    pub fn failure(reason: impl Into<String>) -> Self {
        GattStatus::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GattStatus::Success)
    }
}

/// Write mode applied to the characteristic once the session is ready
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Acknowledged write (the platform default)
    #[default]
    WithResponse,
    WithoutResponse,
}

/// A characteristic as reported by service discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub descriptors: Vec<Uuid>,
}

/// A service as reported by service discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

/// The single service/characteristic/descriptor triple the session talks to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceContract {
    pub service: Uuid,
    pub characteristic: Uuid,
    pub descriptor: Uuid,
}

impl Default for ServiceContract {
    fn default() -> Self {
        Self {
            service: TUTOR_SERVICE_UUID,
            characteristic: TUTOR_CHARACTERISTIC_UUID,
            descriptor: CLIENT_CONFIG_DESCRIPTOR_UUID,
        }
    }
}

impl ServiceContract {
    /// Locate the contract's characteristic in a discovered service table.
    ///
    /// Returns the characteristic only when it sits under the contract's
    /// service.
    pub fn locate<'a>(&self, services: &'a [GattService]) -> Lookup<'a> {
        let Some(service) = services.iter().find(|s| s.uuid == self.service) else {
            return Lookup::ServiceMissing;
        };
        match service
            .characteristics
            .iter()
            .find(|c| c.uuid == self.characteristic)
        {
            Some(characteristic) => Lookup::Found(characteristic),
            None => Lookup::CharacteristicMissing,
        }
    }
}

/// Result of looking up the contract in a service table
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a> {
    Found(&'a GattCharacteristic),
    ServiceMissing,
    CharacteristicMissing,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(service: Uuid, characteristic: Uuid) -> Vec<GattService> {
        vec![GattService {
            uuid: service,
            characteristics: vec![GattCharacteristic {
                uuid: characteristic,
                descriptors: vec![CLIENT_CONFIG_DESCRIPTOR_UUID],
            }],
        }]
    }

    #[test]
    fn test_uuid_strings_match_firmware() {
        assert_eq!(
            TUTOR_SERVICE_UUID.to_string(),
            "19b10000-e8f2-537e-4f6c-d104768a1214"
        );
        assert_eq!(
            TUTOR_CHARACTERISTIC_UUID.to_string(),
            "19b10001-e8f2-537e-4f6c-d104768a1214"
        );
        assert_eq!(
            CLIENT_CONFIG_DESCRIPTOR_UUID.to_string(),
            "00002902-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_contract_lookup() {
        let contract = ServiceContract::default();

        let services = table(TUTOR_SERVICE_UUID, TUTOR_CHARACTERISTIC_UUID);
        assert!(matches!(contract.locate(&services), Lookup::Found(_)));

        let services = table(Uuid::nil(), TUTOR_CHARACTERISTIC_UUID);
        assert_eq!(contract.locate(&services), Lookup::ServiceMissing);

        let services = table(TUTOR_SERVICE_UUID, Uuid::nil());
        assert_eq!(contract.locate(&services), Lookup::CharacteristicMissing);
    }
}
