// src/models/permissions.rs

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::common::error::FetchError;

// ---
// 1. Capability (O "Esquema" fixo de permissões)
// ---
// Conjunto fechado: não existe cadastro de capacidades em tempo de execução.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    CanCreateUsers,
    CanCreateProducts,
    CanCreateInventory,
    CanCreateCustomers,
    CanCreateVendors,
    CanCreateCompanies,
    CanUpdateCompanies,
    CanSendInvoiceEmail,
    CanSendInvoiceWhatsapp,
    CanCreateSaleEntries,
    CanCreatePurchaseEntries,
    CanCreateJournalEntries,
    CanCreateReceiptEntries,
    CanCreatePaymentEntries,
}

impl Capability {
    pub const ALL: [Capability; 14] = [
        Capability::CanCreateUsers,
        Capability::CanCreateProducts,
        Capability::CanCreateInventory,
        Capability::CanCreateCustomers,
        Capability::CanCreateVendors,
        Capability::CanCreateCompanies,
        Capability::CanUpdateCompanies,
        Capability::CanSendInvoiceEmail,
        Capability::CanSendInvoiceWhatsapp,
        Capability::CanCreateSaleEntries,
        Capability::CanCreatePurchaseEntries,
        Capability::CanCreateJournalEntries,
        Capability::CanCreateReceiptEntries,
        Capability::CanCreatePaymentEntries,
    ];

    /// O nome usado no JSON (e no frontend).
    pub const fn as_str(self) -> &'static str {
        match self {
            Capability::CanCreateUsers => "canCreateUsers",
            Capability::CanCreateProducts => "canCreateProducts",
            Capability::CanCreateInventory => "canCreateInventory",
            Capability::CanCreateCustomers => "canCreateCustomers",
            Capability::CanCreateVendors => "canCreateVendors",
            Capability::CanCreateCompanies => "canCreateCompanies",
            Capability::CanUpdateCompanies => "canUpdateCompanies",
            Capability::CanSendInvoiceEmail => "canSendInvoiceEmail",
            Capability::CanSendInvoiceWhatsapp => "canSendInvoiceWhatsapp",
            Capability::CanCreateSaleEntries => "canCreateSaleEntries",
            Capability::CanCreatePurchaseEntries => "canCreatePurchaseEntries",
            Capability::CanCreateJournalEntries => "canCreateJournalEntries",
            Capability::CanCreateReceiptEntries => "canCreateReceiptEntries",
            Capability::CanCreatePaymentEntries => "canCreatePaymentEntries",
        }
    }

    /// Valor quando nenhuma camada define a capacidade: negado (fail-closed).
    pub const fn default_value(self) -> bool {
        false
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = UnknownIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownIdentifier(s.to_string()))
    }
}

// ---
// 2. Limit (Tetos numéricos, só existem no nível do tenant)
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Limit {
    MaxCompanies,
    MaxUsers,
    MaxInventories,
}

impl Limit {
    pub const ALL: [Limit; 3] = [Limit::MaxCompanies, Limit::MaxUsers, Limit::MaxInventories];

    pub const fn as_str(self) -> &'static str {
        match self {
            Limit::MaxCompanies => "maxCompanies",
            Limit::MaxUsers => "maxUsers",
            Limit::MaxInventories => "maxInventories",
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Limit {
    type Err = UnknownIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Limit::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| UnknownIdentifier(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Identificador de permissão desconhecido: {0}")]
pub struct UnknownIdentifier(pub String);

// No JSON: número = teto, `null` = ilimitado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<u64>", into = "Option<u64>")]
pub enum LimitValue {
    Limited(u64),
    Unbounded,
}

impl LimitValue {
    /// `true` se ainda cabe mais um recurso além dos `current` já existentes.
    pub fn allows(self, current: u64) -> bool {
        match self {
            LimitValue::Limited(max) => current < max,
            LimitValue::Unbounded => true,
        }
    }
}

impl From<Option<u64>> for LimitValue {
    fn from(value: Option<u64>) -> Self {
        value.map_or(LimitValue::Unbounded, LimitValue::Limited)
    }
}

impl From<LimitValue> for Option<u64> {
    fn from(value: LimitValue) -> Self {
        match value {
            LimitValue::Limited(max) => Some(max),
            LimitValue::Unbounded => None,
        }
    }
}

// ---
// 3. TriState (concedido / negado / não definido)
// ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriState {
    Granted,
    Denied,
    #[default]
    Unset,
}

impl TriState {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            TriState::Granted => Some(true),
            TriState::Denied => Some(false),
            TriState::Unset => None,
        }
    }
}

impl From<Option<bool>> for TriState {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => TriState::Granted,
            Some(false) => TriState::Denied,
            None => TriState::Unset,
        }
    }
}

// ---
// 4. CapabilityMap (uma camada: tenant ou usuário)
// ---
// Ausência da chave = Unset. Chaves desconhecidas são descartadas na leitura.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityMap(BTreeMap<Capability, bool>);

impl CapabilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, capability: Capability) -> TriState {
        self.0.get(&capability).copied().into()
    }

    pub fn set(&mut self, capability: Capability, value: TriState) {
        match value.as_bool() {
            Some(flag) => {
                self.0.insert(capability, flag);
            }
            None => {
                self.0.remove(&capability);
            }
        }
    }

    pub fn with(mut self, capability: Capability, flag: bool) -> Self {
        self.0.insert(capability, flag);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Capability, bool)> for CapabilityMap {
    fn from_iter<I: IntoIterator<Item = (Capability, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for CapabilityMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(c, flag)| (c.as_str(), flag)))
    }
}

impl<'de> Deserialize<'de> for CapabilityMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let mut map = CapabilityMap::new();

        for (key, value) in raw {
            // Compatibilidade futura: identificador desconhecido é ignorado
            let Ok(capability) = key.parse::<Capability>() else {
                continue;
            };
            match value {
                Value::Bool(flag) => map.set(capability, Some(flag).into()),
                Value::Null => map.set(capability, TriState::Unset),
                other => {
                    return Err(D::Error::custom(format!(
                        "'{}' deve ser true, false ou null (recebido {})",
                        key, other
                    )));
                }
            }
        }

        Ok(map)
    }
}

// ---
// 5. LimitMap (tetos do tenant)
// ---
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LimitMap(BTreeMap<Limit, LimitValue>);

impl LimitMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, limit: Limit) -> Option<LimitValue> {
        self.0.get(&limit).copied()
    }

    pub fn with(mut self, limit: Limit, value: LimitValue) -> Self {
        self.0.insert(limit, value);
        self
    }
}

impl FromIterator<(Limit, LimitValue)> for LimitMap {
    fn from_iter<I: IntoIterator<Item = (Limit, LimitValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for LimitMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(l, value)| (l.as_str(), value)))
    }
}

impl<'de> Deserialize<'de> for LimitMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let mut map = LimitMap::new();

        for (key, value) in raw {
            let Ok(limit) = key.parse::<Limit>() else {
                continue;
            };
            let value = LimitValue::deserialize(value).map_err(|_| {
                D::Error::custom(format!("'{}' deve ser um inteiro não negativo ou null", key))
            })?;
            map.0.insert(limit, value);
        }

        Ok(map)
    }
}

// ---
// 6. TenantPolicy e UserOverride (as duas camadas)
// ---
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantPolicy {
    #[serde(default)]
    pub capabilities: CapabilityMap,
    #[serde(default)]
    pub limits: LimitMap,
}

impl TenantPolicy {
    pub fn capability(&self, capability: Capability) -> TriState {
        self.capabilities.get(capability)
    }

    pub fn limit(&self, limit: Limit) -> Option<LimitValue> {
        self.limits.get(limit)
    }
}

// Começa vazio (tudo Unset) quando o usuário entra no tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOverride {
    #[serde(default)]
    pub capabilities: CapabilityMap,
}

impl UserOverride {
    pub fn capability(&self, capability: Capability) -> TriState {
        self.capabilities.get(capability)
    }
}

// ---
// 7. EffectivePermissions (O resultado resolvido, somente leitura)
// ---
// Sempre cobre todo o esquema: não existe resultado parcial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePermissions {
    capabilities: BTreeMap<Capability, bool>,
    limits: BTreeMap<Limit, LimitValue>,
}

impl EffectivePermissions {
    pub fn from_fn(
        capability: impl Fn(Capability) -> bool,
        limit: impl Fn(Limit) -> LimitValue,
    ) -> Self {
        Self {
            capabilities: Capability::ALL.into_iter().map(|c| (c, capability(c))).collect(),
            limits: Limit::ALL.into_iter().map(|l| (l, limit(l))).collect(),
        }
    }

    /// Tudo negado, todos os tetos em zero.
    pub fn denied() -> Self {
        Self::from_fn(Capability::default_value, |_| LimitValue::Limited(0))
    }

    pub fn allows(&self, capability: Capability) -> bool {
        self.capabilities
            .get(&capability)
            .copied()
            .unwrap_or(capability.default_value())
    }

    pub fn limit(&self, limit: Limit) -> LimitValue {
        self.limits
            .get(&limit)
            .copied()
            .unwrap_or(LimitValue::Limited(0))
    }

    pub fn within_limit(&self, limit: Limit, current: u64) -> bool {
        self.limit(limit).allows(current)
    }

    pub fn granted(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities
            .iter()
            .filter(|(_, flag)| **flag)
            .map(|(c, _)| *c)
    }

    /// Valida a resposta do backend contra o esquema antes de aceitar.
    /// Qualquer valor com tipo errado rejeita o payload inteiro.
    pub fn from_payload(payload: &Value) -> Result<Self, FetchError> {
        let object = payload.as_object().ok_or_else(|| {
            FetchError::SchemaMismatch("a resposta não é um objeto JSON".to_string())
        })?;

        let mut capabilities = BTreeMap::new();
        for capability in Capability::ALL {
            let flag = match object.get(capability.as_str()) {
                None | Some(Value::Null) => capability.default_value(),
                Some(Value::Bool(flag)) => *flag,
                Some(other) => {
                    return Err(FetchError::SchemaMismatch(format!(
                        "'{}' deveria ser booleano, recebido {}",
                        capability, other
                    )));
                }
            };
            capabilities.insert(capability, flag);
        }

        let mut limits = BTreeMap::new();
        for limit in Limit::ALL {
            let value = match object.get(limit.as_str()) {
                None => LimitValue::Limited(0),
                Some(Value::Null) => LimitValue::Unbounded,
                Some(Value::Number(n)) => n.as_u64().map(LimitValue::Limited).ok_or_else(|| {
                    FetchError::SchemaMismatch(format!(
                        "'{}' deveria ser um inteiro não negativo, recebido {}",
                        limit, n
                    ))
                })?,
                Some(other) => {
                    return Err(FetchError::SchemaMismatch(format!(
                        "'{}' deveria ser numérico ou null, recebido {}",
                        limit, other
                    )));
                }
            };
            limits.insert(limit, value);
        }

        Ok(Self { capabilities, limits })
    }
}

// Formato "achatado": { "canCreateUsers": true, ..., "maxUsers": 5 }
impl Serialize for EffectivePermissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.capabilities.len() + self.limits.len()))?;
        for (capability, flag) in &self.capabilities {
            map.serialize_entry(capability.as_str(), flag)?;
        }
        for (limit, value) in &self.limits {
            map.serialize_entry(limit.as_str(), value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EffectivePermissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let payload = Value::deserialize(deserializer)?;
        EffectivePermissions::from_payload(&payload).map_err(D::Error::custom)
    }
}
