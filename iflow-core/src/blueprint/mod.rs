//! Blueprint intermediate representation
//!
//! `dto` is the raw, permissive input shape; `model` is the typed form the
//! semantic validator and generator work on.

pub mod dto;
pub mod model;
pub mod parse;

pub use dto::{
    BlueprintDto, ComponentDto, EndpointDto, LayoutHint, SequenceFlowDto, END_EVENT_ID,
    START_EVENT_ID,
};
pub use model::{
    AdapterKind, Blueprint, Component, ComponentKind, Endpoint, KindParseError, RouterCondition,
    SequenceFlow, ValidatedBlueprint,
};
pub use parse::{load_blueprint, parse_blueprint_json, parse_blueprint_yaml};
