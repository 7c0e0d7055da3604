//! Standard kind catalog for the base telephony surface.
//!
//! Tags and revision lists mirror what a modem-facing client negotiates; the
//! payload layouts behind each shape belong to the codec layer.

#![allow(missing_docs)]

use crate::spec::{
    ArgShape, CatalogError, FieldKind, IndicationKind, IndicationSpec, KindCatalog, KindSpec,
    RequestKind, VersionPolicy,
};
use crate::version::ProtocolVersion as V;

pub const GET_ICC_CARD_STATUS: RequestKind = RequestKind(1);
pub const SUPPLY_ICC_PIN: RequestKind = RequestKind(2);
pub const DIAL: RequestKind = RequestKind(10);
pub const HANGUP: RequestKind = RequestKind(12);
pub const SEND_SMS: RequestKind = RequestKind(25);
pub const SETUP_DATA_CALL: RequestKind = RequestKind(27);
pub const OEM_HOOK_RAW: RequestKind = RequestKind(59);
pub const GET_CELL_INFO_LIST: RequestKind = RequestKind(109);
pub const SET_INDICATION_FILTER: RequestKind = RequestKind(139);
pub const SET_SIGNAL_REPORTING_CRITERIA: RequestKind = RequestKind(148);
pub const GET_MODEM_STACK_STATUS: RequestKind = RequestKind(154);

pub const NETWORK_STATE_CHANGED: IndicationKind = IndicationKind(1002);
pub const SIGNAL_STRENGTH: IndicationKind = IndicationKind(1009);
pub const CELL_INFO_LIST: IndicationKind = IndicationKind(1036);
pub const MODEM_RESET: IndicationKind = IndicationKind(1047);
pub const CARRIER_INFO_FOR_ENCRYPTION: IndicationKind = IndicationKind(1048);

const DIAL_FIELDS: &[FieldKind] = &[FieldKind::Text, FieldKind::Int, FieldKind::Bool];
const DATA_CALL_FIELDS: &[FieldKind] = &[
    FieldKind::Int,
    FieldKind::Text,
    FieldKind::Text,
    FieldKind::Bool,
    FieldKind::Bytes,
];

const REQUESTS: &[KindSpec] = &[
    KindSpec {
        kind: GET_ICC_CARD_STATUS,
        name: "getIccCardStatus",
        args: ArgShape::Void,
        revisions: &[V::V1_0, V::V1_2, V::V1_4, V::V1_5],
        policy: VersionPolicy::Fail,
    },
    KindSpec {
        kind: SUPPLY_ICC_PIN,
        name: "supplyIccPinForApp",
        args: ArgShape::Strings(2),
        revisions: &[V::V1_0],
        policy: VersionPolicy::Fail,
    },
    KindSpec {
        kind: DIAL,
        name: "dial",
        args: ArgShape::Record(DIAL_FIELDS),
        revisions: &[V::V1_0],
        policy: VersionPolicy::Fail,
    },
    KindSpec {
        kind: HANGUP,
        name: "hangup",
        args: ArgShape::Ints(1),
        revisions: &[V::V1_0],
        policy: VersionPolicy::Fail,
    },
    KindSpec {
        kind: SEND_SMS,
        name: "sendSms",
        args: ArgShape::Strings(2),
        revisions: &[V::V1_0],
        policy: VersionPolicy::Fail,
    },
    KindSpec {
        kind: SETUP_DATA_CALL,
        name: "setupDataCall",
        args: ArgShape::Record(DATA_CALL_FIELDS),
        revisions: &[V::V1_0, V::V1_4, V::V1_5, V::V1_6],
        policy: VersionPolicy::Fail,
    },
    KindSpec {
        kind: OEM_HOOK_RAW,
        name: "sendRequestRaw",
        args: ArgShape::Raw,
        revisions: &[V::V1_0],
        policy: VersionPolicy::Fail,
    },
    KindSpec {
        kind: GET_CELL_INFO_LIST,
        name: "getCellInfoList",
        args: ArgShape::Void,
        revisions: &[V::V1_0, V::V1_2, V::V1_4, V::V1_5, V::V1_6],
        policy: VersionPolicy::Fail,
    },
    KindSpec {
        kind: SET_INDICATION_FILTER,
        name: "setIndicationFilter",
        args: ArgShape::Ints(1),
        revisions: &[V::V1_0, V::V1_2, V::V1_5],
        policy: VersionPolicy::Fail,
    },
    KindSpec {
        kind: SET_SIGNAL_REPORTING_CRITERIA,
        name: "setSignalStrengthReportingCriteria",
        args: ArgShape::Ints(4),
        revisions: &[V::V1_2, V::V1_5],
        policy: VersionPolicy::Drop,
    },
    KindSpec {
        kind: GET_MODEM_STACK_STATUS,
        name: "getModemStackStatus",
        args: ArgShape::Void,
        revisions: &[V::V1_3],
        policy: VersionPolicy::Fail,
    },
];

const INDICATIONS: &[IndicationSpec] = &[
    IndicationSpec {
        kind: NETWORK_STATE_CHANGED,
        name: "networkStateChanged",
        revisions: &[V::V1_0],
    },
    IndicationSpec {
        kind: SIGNAL_STRENGTH,
        name: "currentSignalStrength",
        revisions: &[V::V1_0, V::V1_2, V::V1_4, V::V1_6],
    },
    IndicationSpec {
        kind: CELL_INFO_LIST,
        name: "cellInfoList",
        revisions: &[V::V1_0, V::V1_2, V::V1_4, V::V1_5, V::V1_6],
    },
    IndicationSpec {
        kind: MODEM_RESET,
        name: "modemReset",
        revisions: &[V::V1_1],
    },
    IndicationSpec {
        kind: CARRIER_INFO_FOR_ENCRYPTION,
        name: "carrierInfoForImsiEncryption",
        revisions: &[V::V1_1],
    },
];

/// Builds the catalog for the base surface.
pub fn standard() -> Result<KindCatalog, CatalogError> {
    let catalog = REQUESTS
        .iter()
        .try_fold(KindCatalog::new(), |catalog, spec| catalog.with_request(*spec))?;
    INDICATIONS
        .iter()
        .try_fold(catalog, |catalog, spec| catalog.with_indication(*spec))
}
