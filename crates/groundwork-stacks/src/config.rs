/// One availability zone's slice of the address plan.
#[derive(Debug, Clone)]
pub struct ZonePlan {
  /// Full zone name, e.g. `eu-central-1a`.
  pub zone: String,
  pub public_cidr: String,
  pub private_cidr: String,
}

impl ZonePlan {
  pub fn new(
    zone: impl Into<String>,
    public_cidr: impl Into<String>,
    private_cidr: impl Into<String>,
  ) -> Self {
    Self {
      zone: zone.into(),
      public_cidr: public_cidr.into(),
      private_cidr: private_cidr.into(),
    }
  }

  /// Zone suffix used in resource names, e.g. `1a` for `eu-central-1a`.
  pub fn suffix(&self) -> &str {
    self.zone.rsplit('-').next().unwrap_or(&self.zone)
  }

  /// Bare zone letter, e.g. `a` for `eu-central-1a`.
  pub fn letter(&self) -> &str {
    self.suffix().trim_start_matches(|c: char| c.is_ascii_digit())
  }
}

/// Everything the stacks need to name and address their resources.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
  /// Environment (stack) name, woven into every resource name.
  pub env: String,
  pub cluster_name: String,
  pub zones: Vec<ZonePlan>,
}

impl DeploymentConfig {
  /// The default three-zone layout: a /16 VPC split into /20 public and
  /// private subnets per zone.
  pub fn new(env: impl Into<String>, cluster_name: impl Into<String>) -> Self {
    Self {
      env: env.into(),
      cluster_name: cluster_name.into(),
      zones: vec![
        ZonePlan::new("eu-central-1a", "10.0.0.0/20", "10.0.48.0/20"),
        ZonePlan::new("eu-central-1b", "10.0.16.0/20", "10.0.64.0/20"),
        ZonePlan::new("eu-central-1c", "10.0.32.0/20", "10.0.80.0/20"),
      ],
    }
  }
}
