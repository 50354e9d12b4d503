pub mod policy_store;
pub use policy_store::PolicyStore;
pub mod policy_repo;
pub use policy_repo::PolicyRepository;
pub mod memory_store;
pub use memory_store::InMemoryPolicyStore;
