//! Static per-service metadata.
//!
//! Every service is described by one [`ServiceProfile`] entry; all stages
//! read from this table instead of branching on the service name.

/// Section of a config that authenticates as some service principal.
#[derive(Debug, Clone, Copy)]
pub struct AuthBinding {
    pub section: &'static str,
    /// Service whose principal (and credential record) the section uses.
    pub principal: &'static str,
}

/// Setting applied after the environment merge when the option is absent.
#[derive(Debug, Clone, Copy)]
pub struct StaticSetting {
    pub section: &'static str,
    pub option: &'static str,
    pub value: &'static str,
}

/// Additional database sharing the primary's backend decision.
#[derive(Debug, Clone, Copy)]
pub struct AuxiliaryDatabase {
    /// Config section receiving the `connection` option.
    pub section: &'static str,
    /// Database name; also the env prefix (`NOVA_API_DB_HOST`) and embedded file stem.
    pub name: &'static str,
    pub bundle: &'static str,
    /// Seed database registered in the auxiliary's routing table.
    pub seed: Option<SeedDatabase>,
}

#[derive(Debug, Clone, Copy)]
pub struct SeedDatabase {
    pub name: &'static str,
    pub bundle: &'static str,
}

/// Database a native migration command brings to head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationTarget {
    Primary,
    Auxiliary,
}

#[derive(Debug, Clone, Copy)]
pub struct MigrationCommand {
    pub target: MigrationTarget,
    /// `--config-file <path>` is inserted after the program.
    pub argv: &'static [&'static str],
}

#[derive(Debug, Clone, Copy)]
pub struct DatabaseProfile {
    /// Schema bundle describing the primary database's model set.
    pub bundle: &'static str,
    /// Native migration commands, run in order for every database that is
    /// not created from a bundle.
    pub migrations: &'static [MigrationCommand],
    pub auxiliary: Option<AuxiliaryDatabase>,
}

/// Sub-application mounted on the web gateway.
#[derive(Debug, Clone, Copy)]
pub struct GatewayMount {
    pub prefix: &'static str,
    /// WSGI script inside the virtualenv's `bin/`.
    pub script: &'static str,
    pub processes: u32,
    pub threads: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceProfile {
    pub name: &'static str,
    pub config_dir: &'static str,
    /// Template file name inside the template directory.
    pub template: Option<&'static str>,
    pub directories: &'static [&'static str],
    /// Directories whose mode is tightened after creation.
    pub restricted_directories: &'static [(&'static str, u32)],
    pub database: Option<DatabaseProfile>,
    /// Whether the service gets an identity principal and application credential.
    pub principal: bool,
    pub auth_bindings: &'static [AuthBinding],
    pub static_settings: &'static [StaticSetting],
    /// Executables launched as `<program> --config-file <config>`.
    pub processes: &'static [&'static str],
    pub gateway_mount: Option<GatewayMount>,
}

pub const IDENTITY_SERVICE: &str = "keystone";
pub const DASHBOARD_SERVICE: &str = "horizon";

const fn migrate(argv: &'static [&'static str]) -> MigrationCommand {
    MigrationCommand {
        target: MigrationTarget::Primary,
        argv,
    }
}

const fn migrate_auxiliary(argv: &'static [&'static str]) -> MigrationCommand {
    MigrationCommand {
        target: MigrationTarget::Auxiliary,
        argv,
    }
}

const fn authtoken(principal: &'static str) -> AuthBinding {
    AuthBinding {
        section: "keystone_authtoken",
        principal,
    }
}

/// Services in boot order.
pub const SERVICES: &[ServiceProfile] = &[
    ServiceProfile {
        name: IDENTITY_SERVICE,
        config_dir: "/etc/keystone",
        template: Some("keystone.conf"),
        directories: &[
            "/etc/keystone/fernet-keys",
            "/etc/keystone/credential-keys",
            "/var/log/keystone",
        ],
        restricted_directories: &[],
        database: Some(DatabaseProfile {
            bundle: "keystone",
            migrations: &[migrate(&["keystone-manage", "db_sync"])],
            auxiliary: None,
        }),
        principal: false,
        auth_bindings: &[],
        static_settings: &[
            StaticSetting {
                section: "application_credential",
                option: "driver",
                value: "sql",
            },
            StaticSetting {
                section: "application_credential",
                option: "enable",
                value: "True",
            },
        ],
        processes: &[],
        gateway_mount: Some(GatewayMount {
            prefix: "/identity",
            script: "keystone-wsgi-public",
            processes: 5,
            threads: 1,
        }),
    },
    ServiceProfile {
        name: "glance",
        config_dir: "/etc/glance",
        template: Some("glance-api.conf"),
        directories: &["/var/lib/glance/images", "/var/log/glance"],
        restricted_directories: &[("/var/lib/glance/images", 0o750)],
        database: Some(DatabaseProfile {
            bundle: "glance",
            migrations: &[migrate(&["glance-manage", "db_sync"])],
            auxiliary: None,
        }),
        principal: true,
        auth_bindings: &[authtoken("glance")],
        static_settings: &[],
        processes: &["glance-api"],
        gateway_mount: None,
    },
    ServiceProfile {
        name: "cinder",
        config_dir: "/etc/cinder",
        template: Some("cinder.conf"),
        directories: &["/var/lib/cinder/volumes", "/var/log/cinder"],
        restricted_directories: &[],
        database: Some(DatabaseProfile {
            bundle: "cinder",
            migrations: &[migrate(&["cinder-manage", "db", "sync"])],
            auxiliary: None,
        }),
        principal: true,
        auth_bindings: &[authtoken("cinder")],
        static_settings: &[],
        processes: &["cinder-api"],
        gateway_mount: None,
    },
    ServiceProfile {
        name: "neutron",
        config_dir: "/etc/neutron",
        template: Some("neutron.conf"),
        directories: &["/var/lib/neutron", "/var/log/neutron"],
        restricted_directories: &[],
        database: Some(DatabaseProfile {
            bundle: "neutron",
            migrations: &[migrate(&["neutron-db-manage", "upgrade", "heads"])],
            auxiliary: None,
        }),
        principal: true,
        auth_bindings: &[authtoken("neutron")],
        static_settings: &[],
        processes: &["neutron-server"],
        gateway_mount: None,
    },
    ServiceProfile {
        name: "ironic",
        config_dir: "/etc/ironic",
        template: Some("ironic.conf"),
        directories: &["/var/lib/ironic", "/var/log/ironic"],
        restricted_directories: &[],
        database: Some(DatabaseProfile {
            bundle: "ironic",
            migrations: &[migrate(&["ironic-dbsync", "upgrade"])],
            auxiliary: None,
        }),
        principal: true,
        auth_bindings: &[authtoken("ironic")],
        static_settings: &[],
        processes: &["ironic-api"],
        gateway_mount: None,
    },
    ServiceProfile {
        name: "nova",
        config_dir: "/etc/nova",
        template: Some("nova.conf"),
        directories: &["/var/lib/nova", "/var/lib/nova/instances", "/var/log/nova"],
        restricted_directories: &[],
        database: Some(DatabaseProfile {
            bundle: "nova",
            migrations: &[
                migrate_auxiliary(&["nova-manage", "api_db", "sync"]),
                migrate_auxiliary(&["nova-manage", "cell_v2", "map_cell0"]),
                migrate_auxiliary(&[
                    "nova-manage",
                    "cell_v2",
                    "create_cell",
                    "--name=cell1",
                    "--verbose",
                ]),
                migrate(&["nova-manage", "db", "sync"]),
            ],
            auxiliary: Some(AuxiliaryDatabase {
                section: "api_database",
                name: "nova_api",
                bundle: "nova_api",
                seed: Some(SeedDatabase {
                    name: "nova_cell0",
                    bundle: "nova",
                }),
            }),
        }),
        principal: true,
        auth_bindings: &[
            authtoken("nova"),
            AuthBinding {
                section: "ironic",
                principal: "ironic",
            },
            AuthBinding {
                section: "neutron",
                principal: "neutron",
            },
        ],
        static_settings: &[
            StaticSetting {
                section: "DEFAULT",
                option: "compute_driver",
                value: "ironic.IronicDriver",
            },
            StaticSetting {
                section: "DEFAULT",
                option: "osapi_compute_listen",
                value: "0.0.0.0",
            },
            StaticSetting {
                section: "DEFAULT",
                option: "osapi_compute_listen_port",
                value: "8774",
            },
            StaticSetting {
                section: "DEFAULT",
                option: "metadata_listen",
                value: "0.0.0.0",
            },
            StaticSetting {
                section: "DEFAULT",
                option: "metadata_listen_port",
                value: "8775",
            },
        ],
        processes: &["nova-api", "nova-conductor", "nova-scheduler", "nova-compute"],
        gateway_mount: None,
    },
    ServiceProfile {
        name: DASHBOARD_SERVICE,
        config_dir: "/etc/openstack-dashboard",
        template: None,
        directories: &["/var/log/horizon"],
        restricted_directories: &[],
        database: None,
        principal: true,
        auth_bindings: &[],
        static_settings: &[],
        processes: &[],
        gateway_mount: Some(GatewayMount {
            prefix: "/dashboard",
            script: "openstack-dashboard-wsgi",
            processes: 3,
            threads: 10,
        }),
    },
];
