//! 策略领域模块

#![allow(clippy::module_inception)]

pub mod evaluator;
pub mod policy;

pub use evaluator::{
    AbacPolicyEvaluator, AclPolicyEvaluator, PolicyEvaluationRequest, PolicyEvaluationResponse,
    PolicyEvaluator, PolicyEvaluatorRegistry, RbacPolicyEvaluator,
};
pub use policy::{Policy, PolicyId, PolicyRule, PolicyType};
