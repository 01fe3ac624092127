#[macro_use]
pub mod macros;

use serde::{Deserialize, Serialize};
use shardline_sql::{Entity, EntityDescriptor, Json};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prefs {
    pub theme: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Audit {
    pub created_by: String,
}

impl Entity for Audit {
    fn describe(d: EntityDescriptor<Self>) -> EntityDescriptor<Self> {
        d.column("created_by", |a| &a.created_by, |a| &mut a.created_by)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub region: i64,
    pub name: String,
    pub prefs: Json<Prefs>,
    pub audit: Audit,
}

impl Entity for Customer {
    fn describe(d: EntityDescriptor<Self>) -> EntityDescriptor<Self> {
        d.table("crm.customers")
            .column("id,pk,auto", |c| &c.id, |c| &mut c.id)
            .column("region,shard", |c| &c.region, |c| &mut c.region)
            .column("name", |c| &c.name, |c| &mut c.name)
            .column("prefs", |c| &c.prefs, |c| &mut c.prefs)
            .extends(|c| &c.audit, |c| &mut c.audit)
    }
}

pub fn ann() -> Customer {
    Customer {
        id: 0,
        region: 3,
        name: "ann".into(),
        prefs: Json(Prefs {
            theme: "dark".into(),
        }),
        audit: Audit {
            created_by: "ops".into(),
        },
    }
}
