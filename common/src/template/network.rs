use super::{CfnOutput, CfnResource, Template};
use crate::stack::Network;
use serde_json::{json, Value};

impl Template {
    pub fn vpc_id(&self) -> String {
        self.prefixed("Vpc")
    }

    pub fn subnet_id(&self) -> String {
        self.prefixed("PrivateSubnet")
    }

    pub fn security_group_id(&self) -> String {
        self.prefixed("ServiceSecurityGroup")
    }

    /// VPC with one private subnet and the security group of the service
    ///
    /// Instances in the subnet never get a public IP, inbound traffic has to
    /// come through a load balancer or a bastion living in the VPC.
    pub(super) fn network(&self, network: &Network) -> Vec<CfnResource> {
        let vpc = self.vpc_id();

        let availability_zone = match &network.availability_zone {
            Some(zone) => json!(zone),
            None => json!({"Fn::Select": [0, {"Fn::GetAZs": ""}]}),
        };

        vec![
            CfnResource {
                name: vpc.clone(),
                resource: json!({
                    "Type": "AWS::EC2::VPC",
                    "Properties": {
                        "CidrBlock": network.vpc_cidr,
                        "EnableDnsSupport": network.enable_dns_support,
                        "EnableDnsHostnames": network.enable_dns_hostnames,
                        "Tags": self.tags()
                    }
                }),
            },
            CfnResource {
                name: self.subnet_id(),
                resource: json!({
                    "Type": "AWS::EC2::Subnet",
                    "Properties": {
                        "VpcId": {"Ref": vpc},
                        "CidrBlock": network.subnet_cidr,
                        "AvailabilityZone": availability_zone,
                        "MapPublicIpOnLaunch": false,
                        "Tags": self.tags()
                    }
                }),
            },
            CfnResource {
                name: self.security_group_id(),
                resource: json!({
                    "Type": "AWS::EC2::SecurityGroup",
                    "Properties": {
                        "GroupDescription": format!(
                            "Service traffic of {}, port {} only",
                            self.stack().name,
                            network.ingress_port
                        ),
                        "VpcId": {"Ref": vpc},
                        "SecurityGroupIngress": [{
                            "IpProtocol": "tcp",
                            "FromPort": network.ingress_port,
                            "ToPort": network.ingress_port,
                            "CidrIp": network.ingress_cidr
                        }],
                        "SecurityGroupEgress": [{
                            "IpProtocol": "-1",
                            "CidrIp": "0.0.0.0/0"
                        }],
                        "Tags": self.tags()
                    }
                }),
            },
        ]
    }

    /// `NetworkConfiguration` of the service placed into the private subnet
    pub(super) fn service_network(&self) -> Value {
        json!({
            "AwsvpcConfiguration": {
                "AssignPublicIp": "DISABLED",
                "Subnets": [{"Ref": self.subnet_id()}],
                "SecurityGroups": [{"Fn::GetAtt": [self.security_group_id(), "GroupId"]}]
            }
        })
    }

    pub(super) fn network_outputs(&self) -> Vec<CfnOutput> {
        vec![
            CfnOutput {
                name: "VpcId".into(),
                description: "VPC of the service".into(),
                value: json!({"Ref": self.vpc_id()}),
            },
            CfnOutput {
                name: "SubnetId".into(),
                description: "Private subnet of the service".into(),
                value: json!({"Ref": self.subnet_id()}),
            },
            CfnOutput {
                name: "SecurityGroupId".into(),
                description: "Security group of the service".into(),
                value: json!({"Fn::GetAtt": [self.security_group_id(), "GroupId"]}),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::stack;

    #[test]
    fn test_should_keep_subnet_private() {
        let template = Template::new(&stack(true)).unwrap();
        let subnet = &template.resources()[&template.subnet_id()]["Properties"];

        assert_eq!(subnet["MapPublicIpOnLaunch"], false);
        assert_eq!(subnet["VpcId"], json!({"Ref": "Vpcsite"}));
        assert_eq!(
            subnet["AvailabilityZone"],
            json!({"Fn::Select": [0, {"Fn::GetAZs": ""}]})
        );
    }

    #[test]
    fn test_should_open_only_ingress_port() {
        let mut stack = stack(true);
        let network = stack.compute.as_mut().unwrap().network.as_mut().unwrap();
        network.ingress_port = 8080;
        network.availability_zone = Some("us-east-1a".into());

        let template = Template::new(&stack).unwrap();
        let group = &template.resources()[&template.security_group_id()]["Properties"];

        assert_eq!(
            group["SecurityGroupIngress"],
            json!([{"IpProtocol": "tcp", "FromPort": 8080, "ToPort": 8080, "CidrIp": "0.0.0.0/0"}])
        );
        assert_eq!(
            group["SecurityGroupEgress"],
            json!([{"IpProtocol": "-1", "CidrIp": "0.0.0.0/0"}])
        );
        assert_eq!(group["VpcId"], json!({"Ref": "Vpcsite"}));
        assert_eq!(
            template.resources()[&template.subnet_id()]["Properties"]["AvailabilityZone"],
            "us-east-1a"
        );
    }
}
