//! SQL Server templates. Row limits use `TOP n` in the select list.

use super::{keys, QueryTemplate};

/// The SQL Server template table.
pub const TEMPLATES: &[(&str, QueryTemplate)] = &[
    (
        keys::CANDIDATES,
        QueryTemplate {
            select: &["TOP {0} DataID", "ModifyDate"],
            view: "WebNodes",
            filter: "{1,choice,0#1=1|1#(ModifyDate > {2} or (ModifyDate = {2} and DataID > {3}))}\
                     {4,choice,0#|1# and SubType not in ({5})}\
                     {6,choice,0#|1# and -OwnerID not in (select DataID from DTree where SubType in ({7}))} \
                     order by ModifyDate, DataID",
        },
    ),
    (
        keys::DELETES,
        QueryTemplate {
            select: &["TOP {0} AuditDate", "EventID", "DataID"],
            view: "DAuditNew",
            filter: "AuditID = 2 and \
                     {1,choice,0#1=1|1#(AuditDate > {2} or (AuditDate = {2} and EventID > {3}))}\
                     {4,choice,0#|1# and SubType not in ({5})} \
                     order by AuditDate, EventID",
        },
    ),
    (
        keys::LATEST_DELETE,
        QueryTemplate {
            select: &["TOP 1 AuditDate", "EventID", "DataID"],
            view: "DAuditNew",
            filter: "AuditID = 2 order by AuditDate desc, EventID desc",
        },
    ),
    (
        keys::RESULTS,
        QueryTemplate {
            select: &[],
            view: "WebNodes",
            filter: "DataID in ({0}){1,choice,0#|1# and {2}} order by ModifyDate, DataID",
        },
    ),
    (
        keys::ANCESTOR_FILTER,
        QueryTemplate {
            select: &[],
            view: "DTreeAncestors",
            filter: "{0,choice,0#1=1|1#(DataID in ({1}) or DataID in \
                     (select DataID from DTreeAncestors where AncestorID in ({1})))}\
                     {2,choice,0#|1# and not (DataID in ({3}) or DataID in \
                     (select DataID from DTreeAncestors where AncestorID in ({3})))}",
        },
    ),
    (
        keys::PARENTS,
        QueryTemplate {
            select: &["DataID", "ParentID"],
            view: "DTree",
            filter: "DataID in ({0})",
        },
    ),
];
