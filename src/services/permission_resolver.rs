// src/services/permission_resolver.rs

use crate::models::permissions::{
    Capability, EffectivePermissions, LimitValue, TenantPolicy, TriState, UserOverride,
};

/// Combina a política do tenant (teto) com o override do usuário.
///
/// Função pura: mesma entrada, mesma saída, sem I/O. O resultado cobre
/// todas as capacidades e todos os limites do esquema.
pub fn resolve(policy: &TenantPolicy, overrides: &UserOverride) -> EffectivePermissions {
    EffectivePermissions::from_fn(
        |capability| {
            resolve_capability(capability, policy.capability(capability), overrides.capability(capability))
        },
        // Limites são só do tenant. Ausente = 0, nunca ilimitado por omissão.
        |limit| policy.limit(limit).unwrap_or(LimitValue::Limited(0)),
    )
}

/// Regra de precedência de uma única capacidade.
///
/// | tenant  | usuário | efetivo |
/// |---------|---------|---------|
/// | negado  | *       | false   |
/// | concede | negado  | false   |
/// | concede | concede | true    |
/// | concede | vazio   | true    |
/// | vazio   | *       | false   |
pub fn resolve_capability(capability: Capability, ceiling: TriState, user: TriState) -> bool {
    match (ceiling, user) {
        // Negação do tenant é absoluta
        (TriState::Denied, _) => false,
        (TriState::Granted, TriState::Denied) => false,
        (TriState::Granted, TriState::Granted | TriState::Unset) => true,
        // Teto ausente: o override não pode passar do que o tenant nunca concedeu
        (TriState::Unset, _) => capability.default_value(),
    }
}
