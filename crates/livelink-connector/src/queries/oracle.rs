//! Oracle templates. Row limits apply `ROWNUM` to an ordered subquery,
//! since `ROWNUM` is assigned before `ORDER BY` in a flat query.

use super::{keys, QueryTemplate};

/// The Oracle template table.
pub const TEMPLATES: &[(&str, QueryTemplate)] = &[
    (
        keys::CANDIDATES,
        QueryTemplate {
            select: &["DataID", "ModifyDate"],
            view: "(select DataID, ModifyDate from WebNodes where \
                   {1,choice,0#1=1|1#(ModifyDate > {2} or (ModifyDate = {2} and DataID > {3}))}\
                   {4,choice,0#|1# and SubType not in ({5})}\
                   {6,choice,0#|1# and -OwnerID not in (select DataID from DTree where SubType in ({7}))} \
                   order by ModifyDate, DataID)",
            filter: "rownum <= {0}",
        },
    ),
    (
        keys::DELETES,
        QueryTemplate {
            select: &["AuditDate", "EventID", "DataID"],
            view: "(select AuditDate, EventID, DataID from DAuditNew where AuditID = 2 and \
                   {1,choice,0#1=1|1#(AuditDate > {2} or (AuditDate = {2} and EventID > {3}))}\
                   {4,choice,0#|1# and SubType not in ({5})} \
                   order by AuditDate, EventID)",
            filter: "rownum <= {0}",
        },
    ),
    (
        keys::LATEST_DELETE,
        QueryTemplate {
            select: &["AuditDate", "EventID", "DataID"],
            view: "(select AuditDate, EventID, DataID from DAuditNew where AuditID = 2 \
                   order by AuditDate desc, EventID desc)",
            filter: "rownum <= 1",
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
